//! Binding to the native APM SDK.
//!
//! The SDK ships as two shared libraries, the collector client and the
//! transaction library, found under the configured library directory. Both
//! are opened with `dlopen` during [`Agent::init`] and every entry point is
//! resolved with `dlsym`, so nothing is linked at build time and a host
//! without the SDK simply fails `init`.
//!
//! Before `newrelic_init` the collector's message handler is registered with
//! the transaction library; without it the two halves cannot talk and the
//! agent would silently drop data.
//!
//! The libraries are never unloaded: resolved function pointers stay valid
//! for the lifetime of the process.

use super::{guard, Agent, TransactionId};
use crate::errors::AgentError;
use common::secret::{ExposeSecret, SecretString};
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, error, info};

/// Collector client library file name.
pub const COLLECTOR_CLIENT_LIBRARY: &str = "libnewrelic-collector-client.so";

/// Transaction library file name.
pub const TRANSACTION_LIBRARY: &str = "libnewrelic-transaction.so";

/// Frames in reported stack traces are separated by newlines.
const STACK_FRAME_DELIMITER: &str = "\n";

/// [`Agent`] backed by the native SDK libraries.
pub struct NativeAgent {
    library_path: PathBuf,
    sdk: OnceLock<sys::Sdk>,
}

impl NativeAgent {
    /// Agent loading the SDK from `library_path` on `init`.
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            sdk: OnceLock::new(),
        }
    }

    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    pub fn is_initialized(&self) -> bool {
        self.sdk.get().is_some()
    }

    fn sdk(&self) -> Result<&sys::Sdk, AgentError> {
        self.sdk
            .get()
            .ok_or_else(|| AgentError::Unavailable("native agent is not initialized".to_string()))
    }
}

fn c_string(value: &str, argument_name: &str) -> Result<CString, AgentError> {
    CString::new(value).map_err(|_| {
        AgentError::InvalidArgument(format!("{argument_name} contains a NUL byte"))
    })
}

/// Negative SDK return values are error codes.
fn check(operation: &'static str, code: i64) -> Result<i64, AgentError> {
    if code < 0 {
        return Err(AgentError::Sdk { operation, code });
    }
    Ok(code)
}

impl Agent for NativeAgent {
    fn init(
        &self,
        license_key: &SecretString,
        app_name: &str,
        language: &str,
        language_version: &str,
    ) -> Result<(), AgentError> {
        guard::not_blank(license_key.expose_secret(), "license_key")?;
        guard::not_blank(app_name, "app_name")?;
        guard::not_blank(language, "language")?;
        guard::not_blank(language_version, "language_version")?;

        if self.is_initialized() {
            debug!(target: "agent.native", "Native agent already initialized");
            return Ok(());
        }

        let license_key = c_string(license_key.expose_secret(), "license_key")?;
        let app_name_c = c_string(app_name, "app_name")?;
        let language = c_string(language, "language")?;
        let language_version = c_string(language_version, "language_version")?;

        let sdk = sys::Sdk::load(&self.library_path).map_err(|e| {
            error!(
                target: "agent.native",
                library_path = %self.library_path.display(),
                error = %e,
                "Unable to load native agent libraries"
            );
            e
        })?;

        let code = sdk.init(&license_key, &app_name_c, &language, &language_version);
        check("newrelic_init", code).map_err(|e| {
            error!(target: "agent.native", error = %e, "Could not initialize native agent");
            e
        })?;

        // A concurrent init that won the race leaves an equivalent SDK in place
        let _ = self.sdk.set(sdk);

        info!(target: "agent.native", app_name = %app_name, "Native agent initialized");
        Ok(())
    }

    fn begin_transaction(&self) -> Result<TransactionId, AgentError> {
        let raw = self.sdk()?.transaction_begin();
        if raw <= 0 {
            return Err(AgentError::Sdk {
                operation: "newrelic_transaction_begin",
                code: raw,
            });
        }
        TransactionId::new(raw)
    }

    fn set_transaction_name(
        &self,
        transaction_id: TransactionId,
        name: &str,
    ) -> Result<(), AgentError> {
        guard::not_blank(name, "name")?;
        let name = c_string(name, "name")?;

        let code = self
            .sdk()?
            .transaction_set_name(transaction_id.get(), &name);
        check("newrelic_transaction_set_name", code).map(|_| ())
    }

    fn notice_error(
        &self,
        transaction_id: TransactionId,
        error_type: &str,
        error_message: &str,
        stack_trace: &str,
    ) -> Result<(), AgentError> {
        guard::not_blank(error_type, "error_type")?;
        guard::not_blank(error_message, "error_message")?;

        let error_type = c_string(error_type, "error_type")?;
        let error_message = c_string(error_message, "error_message")?;
        let stack_trace = c_string(stack_trace, "stack_trace")?;
        let delimiter = c_string(STACK_FRAME_DELIMITER, "stack_frame_delimiter")?;

        let code = self.sdk()?.transaction_notice_error(
            transaction_id.get(),
            &error_type,
            &error_message,
            &stack_trace,
            &delimiter,
        );
        check("newrelic_transaction_notice_error", code).map(|_| ())
    }

    fn end_transaction(&self, transaction_id: TransactionId) -> Result<(), AgentError> {
        let code = self.sdk()?.transaction_end(transaction_id.get());
        check("newrelic_transaction_end", code).map(|_| ())
    }

    fn record_metric(&self, name: &str, value: f64) -> Result<(), AgentError> {
        guard::not_blank(name, "name")?;
        let name = c_string(name, "name")?;

        let code = self.sdk()?.record_metric(&name, value);
        check("newrelic_record_metric", code).map(|_| ())
    }

    fn shutdown(&self, reason: &str) -> Result<(), AgentError> {
        let reason = c_string(reason, "reason")?;

        let code = self.sdk()?.request_shutdown(&reason);
        check("newrelic_request_shutdown", code).map(|_| ())
    }
}

#[cfg(unix)]
mod sys {
    use super::{COLLECTOR_CLIENT_LIBRARY, TRANSACTION_LIBRARY};
    use crate::errors::AgentError;
    use libc::{c_char, c_double, c_int, c_long, c_void};
    use std::ffi::{CStr, CString};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    type InitFn =
        unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *const c_char) -> c_int;
    type RequestShutdownFn = unsafe extern "C" fn(*const c_char) -> c_int;
    type MessageHandlerFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
    type RegisterMessageHandlerFn = unsafe extern "C" fn(MessageHandlerFn);
    type RecordMetricFn = unsafe extern "C" fn(*const c_char, c_double) -> c_int;
    type TransactionBeginFn = unsafe extern "C" fn() -> c_long;
    type TransactionEndFn = unsafe extern "C" fn(c_long) -> c_int;
    type TransactionSetNameFn = unsafe extern "C" fn(c_long, *const c_char) -> c_int;
    type TransactionNoticeErrorFn = unsafe extern "C" fn(
        c_long,
        *const c_char,
        *const c_char,
        *const c_char,
        *const c_char,
    ) -> c_int;

    /// Resolve `$name` from `$library` as a function pointer of type `$ty`.
    macro_rules! resolve {
        ($library:expr, $name:literal, $ty:ty) => {{
            let symbol = $library.symbol($name)?;
            // SAFETY: `symbol` is a non-null address exported by the SDK under
            // `$name`, whose C signature is `$ty`.
            unsafe { std::mem::transmute::<*mut c_void, $ty>(symbol) }
        }};
    }

    /// An open `dlopen` handle. Never closed.
    struct Library {
        handle: *mut c_void,
        path: String,
    }

    impl Library {
        fn open(path: &Path) -> Result<Self, AgentError> {
            let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
                AgentError::LibraryLoad(format!("{} contains a NUL byte", path.display()))
            })?;

            // SAFETY: `c_path` is a valid NUL-terminated string for the call.
            let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW) };
            if handle.is_null() {
                return Err(AgentError::LibraryLoad(format!(
                    "{}: {}",
                    path.display(),
                    last_dl_error()
                )));
            }

            Ok(Self {
                handle,
                path: path.display().to_string(),
            })
        }

        fn symbol(&self, name: &str) -> Result<*mut c_void, AgentError> {
            let c_name = CString::new(name)
                .map_err(|_| AgentError::LibraryLoad(format!("invalid symbol name {name}")))?;

            // SAFETY: `handle` came from a successful dlopen and is never closed.
            let symbol = unsafe { libc::dlsym(self.handle, c_name.as_ptr()) };
            if symbol.is_null() {
                return Err(AgentError::LibraryLoad(format!(
                    "symbol {name} not found in {}: {}",
                    self.path,
                    last_dl_error()
                )));
            }
            Ok(symbol)
        }
    }

    fn last_dl_error() -> String {
        // SAFETY: dlerror returns null or a NUL-terminated string owned by libc.
        let message = unsafe { libc::dlerror() };
        if message.is_null() {
            return "unknown error".to_string();
        }
        // SAFETY: checked non-null above; copied out before any other dl* call.
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }

    /// Resolved SDK entry points.
    pub(super) struct Sdk {
        init: InitFn,
        request_shutdown: RequestShutdownFn,
        record_metric: RecordMetricFn,
        transaction_begin: TransactionBeginFn,
        transaction_end: TransactionEndFn,
        transaction_set_name: TransactionSetNameFn,
        transaction_notice_error: TransactionNoticeErrorFn,
    }

    impl Sdk {
        /// Open both libraries, resolve every entry point and register the
        /// collector's message handler.
        pub(super) fn load(library_path: &Path) -> Result<Self, AgentError> {
            let collector = Library::open(&library_path.join(COLLECTOR_CLIENT_LIBRARY))?;
            let transaction = Library::open(&library_path.join(TRANSACTION_LIBRARY))?;

            let message_handler = resolve!(collector, "newrelic_message_handler", MessageHandlerFn);
            let register_message_handler = resolve!(
                transaction,
                "newrelic_register_message_handler",
                RegisterMessageHandlerFn
            );

            let sdk = Self {
                init: resolve!(collector, "newrelic_init", InitFn),
                request_shutdown: resolve!(collector, "newrelic_request_shutdown", RequestShutdownFn),
                record_metric: resolve!(transaction, "newrelic_record_metric", RecordMetricFn),
                transaction_begin: resolve!(transaction, "newrelic_transaction_begin", TransactionBeginFn),
                transaction_end: resolve!(transaction, "newrelic_transaction_end", TransactionEndFn),
                transaction_set_name: resolve!(
                    transaction,
                    "newrelic_transaction_set_name",
                    TransactionSetNameFn
                ),
                transaction_notice_error: resolve!(
                    transaction,
                    "newrelic_transaction_notice_error",
                    TransactionNoticeErrorFn
                ),
            };

            // SAFETY: both pointers were resolved from the loaded SDK with
            // their documented signatures.
            unsafe { register_message_handler(message_handler) };

            Ok(sdk)
        }

        pub(super) fn init(
            &self,
            license_key: &CStr,
            app_name: &CStr,
            language: &CStr,
            language_version: &CStr,
        ) -> i64 {
            // SAFETY: all arguments are valid NUL-terminated strings for the call.
            let code = unsafe {
                (self.init)(
                    license_key.as_ptr(),
                    app_name.as_ptr(),
                    language.as_ptr(),
                    language_version.as_ptr(),
                )
            };
            i64::from(code)
        }

        pub(super) fn request_shutdown(&self, reason: &CStr) -> i64 {
            // SAFETY: `reason` is a valid NUL-terminated string for the call.
            i64::from(unsafe { (self.request_shutdown)(reason.as_ptr()) })
        }

        pub(super) fn record_metric(&self, name: &CStr, value: f64) -> i64 {
            // SAFETY: `name` is a valid NUL-terminated string for the call.
            i64::from(unsafe { (self.record_metric)(name.as_ptr(), value) })
        }

        #[allow(clippy::useless_conversion)]
        pub(super) fn transaction_begin(&self) -> i64 {
            // SAFETY: no arguments; the SDK was initialized before use.
            i64::from(unsafe { (self.transaction_begin)() })
        }

        // Ids originate from the SDK as c_long, so the round trip is lossless.
        #[allow(clippy::cast_possible_truncation)]
        pub(super) fn transaction_end(&self, transaction_id: i64) -> i64 {
            // SAFETY: plain integer argument.
            i64::from(unsafe { (self.transaction_end)(transaction_id as c_long) })
        }

        #[allow(clippy::cast_possible_truncation)]
        pub(super) fn transaction_set_name(&self, transaction_id: i64, name: &CStr) -> i64 {
            // SAFETY: `name` is a valid NUL-terminated string for the call.
            i64::from(unsafe { (self.transaction_set_name)(transaction_id as c_long, name.as_ptr()) })
        }

        #[allow(clippy::cast_possible_truncation)]
        pub(super) fn transaction_notice_error(
            &self,
            transaction_id: i64,
            error_type: &CStr,
            error_message: &CStr,
            stack_trace: &CStr,
            stack_frame_delimiter: &CStr,
        ) -> i64 {
            // SAFETY: all string arguments are valid NUL-terminated strings for the call.
            let code = unsafe {
                (self.transaction_notice_error)(
                    transaction_id as c_long,
                    error_type.as_ptr(),
                    error_message.as_ptr(),
                    stack_trace.as_ptr(),
                    stack_frame_delimiter.as_ptr(),
                )
            };
            i64::from(code)
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use crate::errors::AgentError;
    use std::ffi::CStr;
    use std::path::Path;

    /// The SDK only exists for unix hosts; this type has no values.
    pub(super) enum Sdk {}

    impl Sdk {
        pub(super) fn load(_library_path: &Path) -> Result<Self, AgentError> {
            Err(AgentError::Unavailable(
                "native agent requires a unix host".to_string(),
            ))
        }

        pub(super) fn init(&self, _: &CStr, _: &CStr, _: &CStr, _: &CStr) -> i64 {
            match *self {}
        }

        pub(super) fn request_shutdown(&self, _: &CStr) -> i64 {
            match *self {}
        }

        pub(super) fn record_metric(&self, _: &CStr, _: f64) -> i64 {
            match *self {}
        }

        pub(super) fn transaction_begin(&self) -> i64 {
            match *self {}
        }

        pub(super) fn transaction_end(&self, _: i64) -> i64 {
            match *self {}
        }

        pub(super) fn transaction_set_name(&self, _: i64, _: &CStr) -> i64 {
            match *self {}
        }

        pub(super) fn transaction_notice_error(
            &self,
            _: i64,
            _: &CStr,
            _: &CStr,
            _: &CStr,
            _: &CStr,
        ) -> i64 {
            match *self {}
        }
    }
}
