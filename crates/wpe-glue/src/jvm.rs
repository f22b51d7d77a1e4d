//! Process-wide `JavaVM` and per-thread `JNIEnv` access.

use jni::objects::JClass;
use jni::{JNIEnv, JavaVM};
use std::sync::OnceLock;
use wpe_process::HostError;

static JVM: OnceLock<JavaVM> = OnceLock::new();

/// Keep `vm` for the life of the process. The first VM wins.
pub fn init_vm(vm: JavaVM) -> &'static JavaVM {
    JVM.get_or_init(|| vm)
}

pub fn java_vm() -> Option<&'static JavaVM> {
    JVM.get()
}

/// A `JNIEnv` valid on the calling thread.
///
/// Threads the JVM does not know about (WebKit's own threads) are attached
/// permanently, so callers must scope local references with a local frame.
pub fn current_thread_env() -> Result<JNIEnv<'static>, HostError> {
    let vm = java_vm().ok_or_else(|| HostError::Environment("JavaVM not initialized".into()))?;
    vm.attach_current_thread_permanently()
        .map_err(|e| HostError::Environment(e.to_string()))
}

/// Look up `name`, clearing the `NoClassDefFoundError` on failure.
pub fn find_class<'local>(env: &mut JNIEnv<'local>, name: &str) -> anyhow::Result<JClass<'local>> {
    match env.find_class(name) {
        Ok(class) => Ok(class),
        Err(e) => {
            clear_exception(env);
            Err(anyhow::Error::new(e).context(format!("cannot find class {}", name)))
        }
    }
}

/// Describe and clear any pending Java exception.
pub fn clear_exception(env: &mut JNIEnv) {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
    }
}
