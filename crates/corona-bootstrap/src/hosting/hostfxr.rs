//! Native `hostfxr` hosting.
//!
//! Stage 1 loads the library found by [`HostfxrSearch`] and resolves the
//! exports used below. Stage 2 calls
//! `hostfxr_initialize_for_dotnet_command_line` with
//! `[entry_component, args...]` (as if launched through `dotnet`), then
//! `hostfxr_run_app`. Messages the library writes through its error writer
//! during stage 2 are appended to the failure diagnostic.

use std::cell::RefCell;
use std::ffi::{c_void, OsStr, OsString};
use std::path::{Path, PathBuf};
use std::ptr;

use libloading::Library;
use tracing::{debug, info};

use super::discovery::HostfxrSearch;
use super::{check_entry_component, HostingFailure, HostingLoader};

#[cfg(windows)]
type CharT = u16;
#[cfg(not(windows))]
type CharT = std::os::raw::c_char;

type HostfxrHandle = *mut c_void;

type InitializeForCommandLineFn = unsafe extern "C" fn(
    argc: i32,
    argv: *const *const CharT,
    parameters: *const c_void,
    host_context_handle: *mut HostfxrHandle,
) -> i32;
type RunAppFn = unsafe extern "C" fn(host_context_handle: HostfxrHandle) -> i32;
type CloseFn = unsafe extern "C" fn(host_context_handle: HostfxrHandle) -> i32;
type ErrorWriterFn = unsafe extern "C" fn(message: *const CharT);
type SetErrorWriterFn = unsafe extern "C" fn(writer: Option<ErrorWriterFn>) -> Option<ErrorWriterFn>;

const INITIALIZE_SYMBOL: &[u8] = b"hostfxr_initialize_for_dotnet_command_line\0";
const RUN_APP_SYMBOL: &[u8] = b"hostfxr_run_app\0";
const CLOSE_SYMBOL: &[u8] = b"hostfxr_close\0";
const SET_ERROR_WRITER_SYMBOL: &[u8] = b"hostfxr_set_error_writer\0";

/// Exports resolved from a loaded hosting library.
///
/// The function pointers are only valid while `_library` is alive, which is
/// why both live in the same struct.
struct HostfxrApi {
    path: PathBuf,
    initialize: InitializeForCommandLineFn,
    run_app: RunAppFn,
    close: CloseFn,
    set_error_writer: Option<SetErrorWriterFn>,
    _library: Library,
}

impl HostfxrApi {
    fn load(path: &Path) -> Result<Self, String> {
        // SAFETY: loading hostfxr runs its initialisers; it is the library
        // this process exists to load.
        let library = unsafe { Library::new(path) }
            .map_err(|e| format!("failed to load {}: {e}", path.display()))?;

        // SAFETY: the signatures match the exported hostfxr ABI; the copied
        // pointers never outlive `library`, stored alongside them.
        unsafe {
            let initialize = *library
                .get::<InitializeForCommandLineFn>(INITIALIZE_SYMBOL)
                .map_err(|e| missing_export(path, "hostfxr_initialize_for_dotnet_command_line", e))?;
            let run_app = *library
                .get::<RunAppFn>(RUN_APP_SYMBOL)
                .map_err(|e| missing_export(path, "hostfxr_run_app", e))?;
            let close = *library
                .get::<CloseFn>(CLOSE_SYMBOL)
                .map_err(|e| missing_export(path, "hostfxr_close", e))?;
            let set_error_writer = library
                .get::<SetErrorWriterFn>(SET_ERROR_WRITER_SYMBOL)
                .ok()
                .map(|symbol| *symbol);

            Ok(Self {
                path: path.to_path_buf(),
                initialize,
                run_app,
                close,
                set_error_writer,
                _library: library,
            })
        }
    }
}

fn missing_export(path: &Path, name: &str, err: libloading::Error) -> String {
    format!("{} does not export {name}: {err}", path.display())
}

/// [`HostingLoader`] backed by the installed .NET hosting library.
pub struct HostFxr {
    search: HostfxrSearch,
    api: Option<HostfxrApi>,
}

impl HostFxr {
    pub fn new(search: HostfxrSearch) -> Self {
        Self { search, api: None }
    }

    /// Path of the loaded library, once stage 1 has succeeded.
    pub fn library_path(&self) -> Option<&Path> {
        self.api.as_ref().map(|api| api.path.as_path())
    }
}

impl HostingLoader for HostFxr {
    fn load_hosting_library(&mut self) -> Result<(), HostingFailure> {
        if self.api.is_some() {
            return Ok(());
        }
        let path = self.search.locate().map_err(HostingFailure::missing_runtime)?;
        let api = HostfxrApi::load(&path).map_err(HostingFailure::missing_runtime)?;
        info!(path = %path.display(), "loaded hosting library");
        self.api = Some(api);
        Ok(())
    }

    fn load_and_run_entry(
        &mut self,
        args: &[OsString],
        entry_component: &Path,
    ) -> Result<i32, HostingFailure> {
        let api = self.api.as_ref().ok_or_else(|| {
            HostingFailure::missing_runtime("hosting library was not loaded before the entry component")
        })?;

        let entry = check_entry_component(&self.search.app_dir, entry_component)?;
        let argv = NativeArgs::new(entry.as_os_str(), args)
            .map_err(HostingFailure::missing_host_assembly)?;

        let _writer = ErrorCapture::install(api.set_error_writer);
        let mut handle: HostfxrHandle = ptr::null_mut();
        // SAFETY: `argv` outlives the call and holds `argc` NUL-terminated
        // strings; a null parameters pointer selects the defaults.
        let rc = unsafe { (api.initialize)(argv.argc(), argv.as_ptr(), ptr::null(), &mut handle) };

        if rc < 0 || handle.is_null() {
            if !handle.is_null() {
                // SAFETY: non-null handle returned by initialize.
                unsafe { (api.close)(handle) };
            }
            let captured = ErrorCapture::take();
            return Err(HostingFailure::missing_host_assembly(describe_status(
                &entry, rc, &captured,
            )));
        }

        debug!(entry = %entry.display(), status = rc, "initialised host context");
        // SAFETY: `handle` was produced by a successful initialize and is
        // closed exactly once below.
        let exit_code = unsafe {
            let exit_code = (api.run_app)(handle);
            (api.close)(handle);
            exit_code
        };
        info!(entry = %entry.display(), exit_code, "managed entry returned");
        Ok(exit_code)
    }
}

/// Hosting status codes worth naming in a diagnostic.
fn status_name(rc: i32) -> Option<&'static str> {
    let name = match rc as u32 {
        0x8000_8081 => "InvalidArgFailure",
        0x8000_8082 => "CoreHostLibLoadFailure",
        0x8000_8083 => "CoreHostLibMissingFailure",
        0x8000_8089 => "CoreClrInitFailure",
        0x8000_808B => "ResolverInitFailure",
        0x8000_808C => "ResolverResolveFailure",
        0x8000_8093 => "InvalidConfigFile",
        0x8000_8094 => "AppArgNotRunnable",
        0x8000_8096 => "FrameworkMissingFailure",
        0x8000_80A3 => "HostInvalidState",
        _ => return None,
    };
    Some(name)
}

fn describe_status(entry: &Path, rc: i32, captured: &[String]) -> String {
    let mut text = format!(
        "failed to initialise {} (hostfxr status 0x{:08X}",
        entry.display(),
        rc as u32
    );
    if let Some(name) = status_name(rc) {
        text.push_str(", ");
        text.push_str(name);
    }
    text.push(')');
    for line in captured {
        text.push('\n');
        text.push_str(line.trim_end());
    }
    text
}

/// Owned, NUL-terminated argument buffers plus the pointer array handed to
/// the hosting library.
struct NativeArgs {
    _buffers: Vec<Vec<CharT>>,
    pointers: Vec<*const CharT>,
}

impl NativeArgs {
    fn new(entry: &OsStr, args: &[OsString]) -> Result<Self, String> {
        let buffers = std::iter::once(entry)
            .chain(args.iter().map(OsString::as_os_str))
            .map(encode)
            .collect::<Result<Vec<_>, _>>()?;
        let pointers = buffers.iter().map(|b| b.as_ptr()).collect();
        Ok(Self {
            _buffers: buffers,
            pointers,
        })
    }

    fn argc(&self) -> i32 {
        self.pointers.len() as i32
    }

    fn as_ptr(&self) -> *const *const CharT {
        self.pointers.as_ptr()
    }
}

#[cfg(windows)]
fn encode(arg: &OsStr) -> Result<Vec<CharT>, String> {
    use std::os::windows::ffi::OsStrExt;

    let mut wide: Vec<u16> = arg.encode_wide().collect();
    if wide.contains(&0) {
        return Err(format!("argument contains a NUL character: {arg:?}"));
    }
    wide.push(0);
    Ok(wide)
}

#[cfg(not(windows))]
fn encode(arg: &OsStr) -> Result<Vec<CharT>, String> {
    use std::os::unix::ffi::OsStrExt;

    let bytes = arg.as_bytes();
    if bytes.contains(&0) {
        return Err(format!("argument contains a NUL character: {arg:?}"));
    }
    Ok(bytes
        .iter()
        .map(|&b| b as CharT)
        .chain(std::iter::once(0))
        .collect())
}

thread_local! {
    static CAPTURED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

unsafe extern "C" fn capture_error(message: *const CharT) {
    if message.is_null() {
        return;
    }
    // SAFETY: hostfxr passes a NUL-terminated string valid for this call.
    let text = unsafe { decode(message) };
    CAPTURED.with(|c| c.borrow_mut().push(text));
}

#[cfg(windows)]
unsafe fn decode(message: *const CharT) -> String {
    let mut len = 0usize;
    // SAFETY: caller guarantees NUL termination.
    unsafe {
        while *message.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(message, len))
    }
}

#[cfg(not(windows))]
unsafe fn decode(message: *const CharT) -> String {
    // SAFETY: caller guarantees NUL termination.
    unsafe { std::ffi::CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

/// Routes hostfxr error output into a thread-local buffer while alive.
struct ErrorCapture {
    set_error_writer: Option<SetErrorWriterFn>,
    previous: Option<ErrorWriterFn>,
}

impl ErrorCapture {
    fn install(set_error_writer: Option<SetErrorWriterFn>) -> Self {
        CAPTURED.with(|c| c.borrow_mut().clear());
        let previous = set_error_writer.and_then(|set| {
            // SAFETY: `capture_error` matches the writer signature and is a
            // plain function, valid for the life of the process.
            unsafe { set(Some(capture_error as ErrorWriterFn)) }
        });
        Self {
            set_error_writer,
            previous,
        }
    }

    fn take() -> Vec<String> {
        CAPTURED.with(|c| std::mem::take(&mut *c.borrow_mut()))
    }
}

impl Drop for ErrorCapture {
    fn drop(&mut self) {
        if let Some(set) = self.set_error_writer {
            // SAFETY: restores whatever writer was registered before.
            unsafe { set(self.previous) };
        }
    }
}
