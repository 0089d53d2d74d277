//! The process-wide JVM handle and its launch configuration.
//!
//! A process can host a single JVM. [`VirtualMachine::new`] launches it on
//! first use (locating libjvm through `JVM_LIB_PATH` or `JAVA_HOME`) and hands
//! out the same instance afterwards. [`JavaVmBuilder`] gives control over the
//! JNI version, JVM options and class path before that first launch.
//!
//! ```rust,ignore
//! use jni_host::{JavaVmBuilder, VirtualMachine};
//!
//! let vm = JavaVmBuilder::default()
//!     .option("-Xmx256m")
//!     .class_path("./target/classes")
//!     .create()?;
//! let env = vm.env()?;
//! let math = env.find_class("java/lang/Math")?;
//! ```

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::env::Env;
use crate::error::{describe_jni_code, Error, Result};
use crate::refs::GlobalRegistry;
use crate::sys::jni;

/// Explicit path to the libjvm shared library.
pub const JVM_LIB_PATH_VAR: &str = "JVM_LIB_PATH";
/// JDK/JRE root searched for libjvm.
pub const JAVA_HOME_VAR: &str = "JAVA_HOME";
/// Whitespace separated JVM options picked up by [`JavaVmBuilder::from_env`].
pub const JVM_OPTS_VAR: &str = "JNI_HOST_JVM_OPTS";
/// Class path picked up by [`JavaVmBuilder::from_env`].
pub const CLASSPATH_VAR: &str = "CLASSPATH";

/// Helper to call JavaVM functions through the invocation table.
macro_rules! jvm_call {
    ($vm:expr, $func:ident $(, $arg:expr)* $(,)?) => {{
        let vm_ptr: *mut jni::JavaVM = $vm;
        let f = (**vm_ptr).$func.ok_or(Error::MissingFunction(stringify!($func)))?;
        f(vm_ptr $(, $arg)*)
    }};
}

static PROCESS_VM: Mutex<Option<VirtualMachine>> = parking_lot::const_mutex(None);

struct Shared {
    raw: *mut jni::JavaVM,
    version: jni::jint,
    /// Created by this crate (so `destroy` may call `DestroyJavaVM`).
    owned: bool,
    destroyed: AtomicBool,
    /// Serialises `destroy`.
    teardown: Mutex<()>,
    /// Attach generation of each thread this handle handed environments to.
    /// An `Env` is only usable while its generation is still recorded.
    attachments: Mutex<HashMap<ThreadId, u64>>,
    next_generation: AtomicU64,
    globals: GlobalRegistry,
    _lib: Option<libloading::Library>,
}

// The JavaVM pointer is valid process-wide; per-thread state lives in Env.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// Handle to the running JVM. Cheap to clone and shareable across threads.
#[derive(Clone)]
pub struct VirtualMachine {
    shared: Arc<Shared>,
}

impl VirtualMachine {
    /// Returns the process JVM, launching it from [`JavaVmBuilder::from_env`]
    /// if none is running yet.
    pub fn new() -> Result<Self> {
        let mut slot = PROCESS_VM.lock();
        if let Some(vm) = slot.as_ref() {
            if vm.is_destroyed() {
                return Err(Error::Launch(
                    "the JVM of this process was destroyed and cannot be relaunched".to_string(),
                ));
            }
            return Ok(vm.clone());
        }
        let vm = JavaVmBuilder::from_env().launch()?;
        *slot = Some(vm.clone());
        Ok(vm)
    }

    /// The process JVM, if one has been launched through this crate.
    pub fn global() -> Option<Self> {
        PROCESS_VM.lock().clone()
    }

    /// Wraps a JVM created elsewhere, e.g. the one that loaded this library.
    ///
    /// The handle is not installed as the process JVM and `destroy` will not
    /// shut the JVM down.
    ///
    /// # Safety
    ///
    /// `raw` must be a valid `JavaVM*` that stays alive for as long as any
    /// handle or environment derived from it is used.
    pub unsafe fn from_raw(raw: *mut jni::JavaVM, version: jni::jint) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::AttachError { code: jni::JNI_ERR, reason: "null JavaVM pointer".to_string() });
        }
        Ok(Self::wrap(raw, version, false, None))
    }

    pub(crate) fn wrap(raw: *mut jni::JavaVM, version: jni::jint, owned: bool, lib: Option<libloading::Library>) -> Self {
        VirtualMachine {
            shared: Arc::new(Shared {
                raw,
                version,
                owned,
                destroyed: AtomicBool::new(false),
                teardown: Mutex::new(()),
                attachments: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                globals: GlobalRegistry::new(),
                _lib: lib,
            }),
        }
    }

    /// Returns the raw `JavaVM*` pointer.
    pub fn raw(&self) -> *mut jni::JavaVM {
        self.shared.raw
    }

    /// The JNI version requested from `GetEnv`.
    pub fn version(&self) -> jni::jint {
        self.shared.version
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    /// Number of promoted references not yet released.
    pub fn global_ref_count(&self) -> usize {
        self.shared.globals.live_count()
    }

    pub(crate) fn globals(&self) -> &GlobalRegistry {
        &self.shared.globals
    }

    /// Whether environments of `thread` from attach `generation` may still
    /// reach the JVM.
    pub(crate) fn is_attached(&self, thread: ThreadId, generation: u64) -> bool {
        !self.is_destroyed() && self.shared.attachments.lock().get(&thread) == Some(&generation)
    }

    fn record_attachment(&self, thread: ThreadId, fresh: bool) -> u64 {
        let mut attachments = self.shared.attachments.lock();
        if !fresh {
            if let Some(&generation) = attachments.get(&thread) {
                return generation;
            }
        }
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        attachments.insert(thread, generation);
        generation
    }

    /// Returns the calling thread's environment, attaching the thread first if
    /// it is not attached yet.
    pub fn env(&self) -> Result<Env> {
        if self.is_destroyed() {
            return Err(Error::AttachError {
                code: jni::JNI_EDETACHED,
                reason: "virtual machine was destroyed".to_string(),
            });
        }
        self.attach_env()
    }

    fn attach_env(&self) -> Result<Env> {
        let mut env_ptr: *mut c_void = ptr::null_mut();
        let res = unsafe { jvm_call!(self.raw(), GetEnv, &mut env_ptr, self.version()) };
        let fresh = match res {
            jni::JNI_OK => false,
            jni::JNI_EDETACHED => {
                let thread = std::thread::current();
                let name = thread.name().and_then(|n| CString::new(n).ok());
                let mut args = jni::JavaVMAttachArgs {
                    version: self.version(),
                    name: name.as_ref().map_or(ptr::null_mut(), |n| n.as_ptr() as *mut _),
                    group: ptr::null_mut(),
                };
                let res = unsafe {
                    jvm_call!(self.raw(), AttachCurrentThread, &mut env_ptr, &mut args as *mut _ as *mut c_void)
                };
                if res != jni::JNI_OK {
                    return Err(Error::AttachError { code: res, reason: describe_jni_code(res).to_string() });
                }
                debug!(thread = ?thread.id(), name = ?thread.name(), "attached thread to the JVM");
                true
            }
            code => {
                return Err(Error::AttachError { code, reason: describe_jni_code(code).to_string() });
            }
        };
        if env_ptr.is_null() {
            return Err(Error::AttachError { code: jni::JNI_ERR, reason: "JVM returned a null JNIEnv".to_string() });
        }
        let generation = self.record_attachment(std::thread::current().id(), fresh);
        Ok(unsafe { Env::from_raw(env_ptr as *mut jni::JNIEnv, self.clone(), generation) })
    }

    /// Detaches the calling thread. Environments obtained on it become
    /// unusable and fail with `AttachError`; their local references are
    /// dropped without touching the JVM.
    pub fn detach_current_thread(&self) -> Result<()> {
        let res = unsafe { jvm_call!(self.raw(), DetachCurrentThread) };
        if res != jni::JNI_OK {
            return Err(Error::AttachError { code: res, reason: describe_jni_code(res).to_string() });
        }
        self.shared.attachments.lock().remove(&std::thread::current().id());
        debug!(thread = ?std::thread::current().id(), "detached thread from the JVM");
        Ok(())
    }

    /// Shuts the JVM down.
    ///
    /// Global references that were never released are deleted first. For a
    /// handle made with [`VirtualMachine::from_raw`] the JVM itself is left
    /// running. Existing environments become unusable. Calling this again
    /// after success is a no-op; after a failure it retries the teardown.
    pub fn destroy(&self) -> Result<()> {
        let _teardown = self.shared.teardown.lock();
        if self.is_destroyed() {
            return Ok(());
        }

        if self.shared.globals.live_count() > 0 {
            let env = self.attach_env()?;
            let leaked = self.shared.globals.drain();
            warn!(count = leaked.len(), "deleting global references that were never released");
            for raw in leaked {
                env.delete_global_raw(raw);
            }
        }

        if self.shared.owned {
            let res = unsafe { jvm_call!(self.raw(), DestroyJavaVM) };
            if res != jni::JNI_OK {
                return Err(Error::Launch(format!("DestroyJavaVM failed: {}", describe_jni_code(res))));
            }
            debug!("destroyed the JVM");
        }
        self.shared.destroyed.store(true, Ordering::Release);
        self.shared.attachments.lock().clear();
        Ok(())
    }
}

impl std::fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("raw", &self.shared.raw)
            .field("version", &format_args!("{:#x}", self.shared.version))
            .field("owned", &self.shared.owned)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// =========================================================================
// Locating libjvm
// =========================================================================

fn libjvm_filename() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "jvm.dll"
    }
    #[cfg(target_os = "macos")]
    {
        "libjvm.dylib"
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        "libjvm.so"
    }
}

fn candidates_from_java_home(java_home: &Path) -> Vec<PathBuf> {
    let filename = libjvm_filename();
    let arch = std::env::consts::ARCH;

    let mut rels = vec![
        format!("lib/server/{filename}"),
        format!("jre/lib/server/{filename}"),
        format!("lib/{arch}/server/{filename}"),
        format!("jre/lib/{arch}/server/{filename}"),
    ];
    if cfg!(target_os = "windows") {
        rels.push(format!("bin/server/{filename}"));
        rels.push(format!("jre/bin/server/{filename}"));
    }

    rels.into_iter().map(|r| java_home.join(r)).collect()
}

fn find_under_java_home(java_home: &Path) -> Result<PathBuf> {
    candidates_from_java_home(java_home).into_iter().find(|p| p.exists()).ok_or_else(|| {
        Error::Launch(format!(
            "could not find {} under {}={}; set {} explicitly",
            libjvm_filename(),
            JAVA_HOME_VAR,
            java_home.display(),
            JVM_LIB_PATH_VAR,
        ))
    })
}

/// Locates libjvm through `JVM_LIB_PATH`, then `JAVA_HOME`.
pub fn find_libjvm() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(JVM_LIB_PATH_VAR) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::Launch(format!("{JVM_LIB_PATH_VAR} is set but does not exist: {}", path.display())));
    }
    if let Some(java_home) = std::env::var_os(JAVA_HOME_VAR) {
        return find_under_java_home(Path::new(&java_home));
    }
    Err(Error::Launch(format!("neither {JVM_LIB_PATH_VAR} nor {JAVA_HOME_VAR} is set; cannot locate libjvm")))
}

// =========================================================================
// JavaVmBuilder
// =========================================================================

/// Launch configuration for the process JVM.
#[derive(Debug, Clone)]
pub struct JavaVmBuilder {
    version: jni::jint,
    options: Vec<String>,
    class_path: Vec<PathBuf>,
    ignore_unrecognized: bool,
    library: Option<PathBuf>,
    java_home: Option<PathBuf>,
}

impl Default for JavaVmBuilder {
    fn default() -> Self {
        JavaVmBuilder::new(jni::JNI_VERSION_1_8)
    }
}

impl JavaVmBuilder {
    /// Create a new builder for the given JNI version (e.g. `jni::JNI_VERSION_1_8`).
    pub fn new(version: jni::jint) -> Self {
        Self {
            version,
            options: Vec::new(),
            class_path: Vec::new(),
            ignore_unrecognized: false,
            library: None,
            java_home: None,
        }
    }

    /// Default builder plus `JNI_HOST_JVM_OPTS` and `CLASSPATH` from the environment.
    pub fn from_env() -> Self {
        let mut builder = Self::default();
        if let Ok(opts) = std::env::var(JVM_OPTS_VAR) {
            builder = builder.options(split_options(&opts));
        }
        if let Some(class_path) = std::env::var_os(CLASSPATH_VAR) {
            builder.class_path.extend(std::env::split_paths(&class_path));
        }
        builder
    }

    /// Add a JVM option like `-Xmx1g` or `-Dkey=value`.
    pub fn option(mut self, opt: impl Into<String>) -> Self {
        self.options.push(opt.into());
        self
    }

    /// Add multiple JVM options.
    pub fn options<I, S>(mut self, opts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(opts.into_iter().map(Into::into));
        self
    }

    /// Append a class path entry; entries become one `-Djava.class.path`.
    pub fn class_path(mut self, entry: impl Into<PathBuf>) -> Self {
        self.class_path.push(entry.into());
        self
    }

    /// Set whether unrecognized options should be ignored.
    pub fn ignore_unrecognized(mut self, value: bool) -> Self {
        self.ignore_unrecognized = value;
        self
    }

    /// Load libjvm from this exact path instead of searching.
    pub fn library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    /// Search this JDK root instead of `JAVA_HOME`.
    pub fn java_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.java_home = Some(path.into());
        self
    }

    /// The option strings handed to `JNI_CreateJavaVM`.
    pub fn option_strings(&self) -> Result<Vec<CString>> {
        let mut out = self.options.iter().map(|o| CString::new(o.as_str())).collect::<Result<Vec<_>, _>>()?;
        if !self.class_path.is_empty() {
            let joined = std::env::join_paths(&self.class_path)
                .map_err(|e| Error::Launch(format!("invalid class path: {e}")))?;
            out.push(CString::new(format!("-Djava.class.path={}", joined.to_string_lossy()))?);
        }
        Ok(out)
    }

    fn locate_library(&self) -> Result<PathBuf> {
        if let Some(path) = &self.library {
            return if path.exists() {
                Ok(path.clone())
            } else {
                Err(Error::Launch(format!("libjvm not found at {}", path.display())))
            };
        }
        if let Some(java_home) = &self.java_home {
            return find_under_java_home(java_home);
        }
        find_libjvm()
    }

    /// Launches the JVM and installs it as the process JVM.
    ///
    /// Fails if this process already has one; use [`VirtualMachine::new`] or
    /// [`VirtualMachine::global`] to reach it.
    pub fn create(self) -> Result<VirtualMachine> {
        let mut slot = PROCESS_VM.lock();
        if slot.is_some() {
            return Err(Error::Launch("a JVM has already been created in this process".to_string()));
        }
        let vm = self.launch()?;
        *slot = Some(vm.clone());
        Ok(vm)
    }

    /// Launches (or adopts an already running) JVM without touching the
    /// process slot.
    fn launch(self) -> Result<VirtualMachine> {
        let path = self.locate_library()?;
        debug!(path = %path.display(), "loading libjvm");
        let lib = unsafe { libloading::Library::new(&path) }.map_err(|e| Error::Launch(e.to_string()))?;

        if let Some(vm) = unsafe { self.adopt_existing(&lib)? } {
            return Ok(vm);
        }

        let create: jni::JNI_CreateJavaVM = unsafe {
            *lib.get::<jni::JNI_CreateJavaVM>(b"JNI_CreateJavaVM\0")
                .map_err(|e| Error::Launch(e.to_string()))?
        };
        let raw = unsafe { self.create_raw(create)? };
        Ok(VirtualMachine::wrap(raw, self.version, true, Some(lib)))
    }

    /// A JVM started by someone else in this process (libjvm allows only one).
    unsafe fn adopt_existing(&self, lib: &libloading::Library) -> Result<Option<VirtualMachine>> {
        let Ok(get_created) = lib.get::<jni::JNI_GetCreatedJavaVMs>(b"JNI_GetCreatedJavaVMs\0") else {
            return Ok(None);
        };
        let mut raw: *mut jni::JavaVM = ptr::null_mut();
        let mut count: jni::jsize = 0;
        let res = get_created(&mut raw, 1, &mut count);
        if res != jni::JNI_OK || count == 0 || raw.is_null() {
            return Ok(None);
        }
        debug!("attaching to a JVM already running in this process");
        Ok(Some(VirtualMachine::wrap(raw, self.version, false, None)))
    }

    /// Create a JVM using a raw `JNI_CreateJavaVM` function pointer.
    ///
    /// The returned handle owns the JVM (its `destroy` shuts it down) but is
    /// not installed as the process JVM.
    ///
    /// # Safety
    /// The caller must ensure the function pointer is valid and the JVM
    /// shared library remains loaded for the lifetime of the returned handle.
    pub unsafe fn create_with(self, create: jni::JNI_CreateJavaVM) -> Result<VirtualMachine> {
        let raw = self.create_raw(create)?;
        Ok(VirtualMachine::wrap(raw, self.version, true, None))
    }

    unsafe fn create_raw(&self, create: jni::JNI_CreateJavaVM) -> Result<*mut jni::JavaVM> {
        let options = self.option_strings()?;
        let mut opt_structs: Vec<jni::JavaVMOption> = options
            .iter()
            .map(|s| jni::JavaVMOption { optionString: s.as_ptr() as *mut _, extraInfo: ptr::null_mut() })
            .collect();

        let mut args = jni::JavaVMInitArgs {
            version: self.version,
            nOptions: opt_structs.len() as jni::jint,
            options: if opt_structs.is_empty() { ptr::null_mut() } else { opt_structs.as_mut_ptr() },
            ignoreUnrecognized: if self.ignore_unrecognized { jni::JNI_TRUE } else { jni::JNI_FALSE },
        };

        let mut vm: *mut jni::JavaVM = ptr::null_mut();
        let mut env: *mut c_void = ptr::null_mut();
        let res = create(&mut vm, &mut env, &mut args as *mut _ as *mut c_void);
        if res != jni::JNI_OK {
            return Err(Error::Launch(format!("JNI_CreateJavaVM failed: {} ({res})", describe_jni_code(res))));
        }
        if vm.is_null() || env.is_null() {
            return Err(Error::Launch("JNI_CreateJavaVM returned a null pointer".to_string()));
        }
        debug!(version = format_args!("{:#x}", self.version), options = options.len(), "created JVM");
        Ok(vm)
    }
}

fn split_options(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}
