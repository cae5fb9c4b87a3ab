//! Tessel C ABI
//!
//! Exposes the engine as `tessel_*` functions for host bindings. Decoded
//! images live in a process-wide handle table and hosts refer to them with
//! opaque `u64` handles; 0 is never a valid handle. The table lock is only
//! held to look a handle up. Each image has its own lock, so calls on
//! distinct images never wait for each other. Functions that fail record a
//! message retrievable with [`tessel_last_error`] on the same thread.
//! Panics never cross the boundary.
//!
//! The tile scratch buffer is allocated by [`tessel_engine_init`] and freed
//! by [`tessel_engine_shutdown`]; tile rendering fails while it is not
//! allocated.

mod handles;

use handles::HandleTable;
use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_void, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tessel_core::{
    render_to_surface, Image, ImageFormat, RenderRequest, Rgba, SurfaceMut, TileRenderer,
    TileRequest, BYTES_PER_PIXEL,
};
use tessel_decoder::Decoder;

/// Result type for tessel-ffi operations
pub type Result<T> = std::result::Result<T, FfiError>;

/// Error types for tessel-ffi operations
#[derive(Debug, thiserror::Error)]
pub enum FfiError {
    #[error("Invalid or released image handle: {0:#x}")]
    InvalidHandle(u64),

    #[error("Null pointer passed for `{0}`")]
    NullPointer(&'static str),

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Handle table is full")]
    TableFull,

    #[error("Decode error: {0}")]
    Decode(#[from] tessel_decoder::Error),

    #[error("Tessel core error: {0}")]
    Core(#[from] tessel_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Panic in {0}")]
    Panic(&'static str),
}

/// Summary of a decoded image, filled in by the decode functions
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TesselImageInfo {
    pub width: u32,
    pub height: u32,
    /// One of the `TESSEL_FORMAT_*` constants
    pub format: u32,
    pub animated: bool,
    pub frame_count: u32,
}

pub const TESSEL_FORMAT_PNG: u32 = 1;
pub const TESSEL_FORMAT_JPEG: u32 = 2;
pub const TESSEL_FORMAT_GIF: u32 = 3;
pub const TESSEL_FORMAT_WEBP: u32 = 4;
pub const TESSEL_FORMAT_BMP: u32 = 5;
pub const TESSEL_FORMAT_RAW: u32 = 6;

/// Receives a rendered tile: tightly packed RGBA8 rows, `width * height * 4`
/// bytes, valid only for the duration of the call. When `init` is true the
/// host should (re)allocate the texture, otherwise update a sub-region.
///
/// The callback must not call back into this library.
pub type TesselUploadFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    init: bool,
    width: u32,
    height: u32,
    pixels: *const u8,
    len: usize,
);

type SharedImage = Arc<RwLock<Image>>;

static IMAGES: Mutex<HandleTable<SharedImage>> = Mutex::new(HandleTable::new());
static TILES: Mutex<Option<TileRenderer>> = Mutex::new(None);

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

// A panic inside a guarded call leaves the tables consistent, so poisoning
// is ignored.
fn images() -> MutexGuard<'static, HandleTable<SharedImage>> {
    IMAGES.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Looks the handle up; the table is unlocked again on return
fn shared(handle: u64) -> Result<SharedImage> {
    Ok(Arc::clone(images().get(handle)?))
}

fn read(image: &SharedImage) -> RwLockReadGuard<'_, Image> {
    image.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(image: &SharedImage) -> RwLockWriteGuard<'_, Image> {
    image.write().unwrap_or_else(PoisonError::into_inner)
}

fn tiles() -> MutexGuard<'static, Option<TileRenderer>> {
    TILES.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_last_error(err: &FfiError) {
    tracing::debug!(error = %err, "tessel call failed");
    let message = CString::new(err.to_string().replace('\0', " ")).ok();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = message);
}

/// Runs `body`, converting errors and panics into `fallback`
fn guarded<T>(name: &'static str, fallback: T, body: impl FnOnce() -> Result<T>) -> T {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            set_last_error(&err);
            fallback
        }
        Err(_) => {
            set_last_error(&FfiError::Panic(name));
            fallback
        }
    }
}

fn format_code(format: ImageFormat) -> u32 {
    match format {
        ImageFormat::Png => TESSEL_FORMAT_PNG,
        ImageFormat::Jpeg => TESSEL_FORMAT_JPEG,
        ImageFormat::Gif => TESSEL_FORMAT_GIF,
        ImageFormat::WebP => TESSEL_FORMAT_WEBP,
        ImageFormat::Bmp => TESSEL_FORMAT_BMP,
        ImageFormat::Raw => TESSEL_FORMAT_RAW,
    }
}

fn image_info(image: &Image) -> TesselImageInfo {
    TesselImageInfo {
        width: image.width(),
        height: image.height(),
        format: format_code(image.format()),
        animated: image.is_animated(),
        frame_count: u32::try_from(image.frame_count()).unwrap_or(u32::MAX),
    }
}

/// Stores the image and reports it through `out_info` (which may be null)
unsafe fn register(image: Image, out_info: *mut TesselImageInfo) -> Result<u64> {
    let info = image_info(&image);
    let handle = images().insert(Arc::new(RwLock::new(image)))?;
    if !out_info.is_null() {
        unsafe { ptr::write(out_info, info) };
    }
    tracing::debug!(handle, width = info.width, height = info.height, "registered image");
    Ok(handle)
}

// ──────────────────── C-ABI functions ────────────────────

/// Allocates the tile scratch buffer. Calling it again is harmless.
/// Returns 0 on success, -1 on failure.
#[no_mangle]
pub extern "C" fn tessel_engine_init() -> c_int {
    guarded("tessel_engine_init", -1, || {
        let mut tiles = tiles();
        if tiles.is_none() {
            *tiles = Some(TileRenderer::new()?);
        }
        Ok(0)
    })
}

/// Frees the tile scratch buffer. Images stay valid.
#[no_mangle]
pub extern "C" fn tessel_engine_shutdown() {
    guarded("tessel_engine_shutdown", (), || {
        tiles().take();
        Ok(())
    })
}

/// Decodes `len` bytes at `data`. The bytes are not retained.
/// Returns an image handle, or 0 on failure.
///
/// # Safety
/// `data` must point to `len` readable bytes; `out_info` must be null or
/// point to writable storage for a `TesselImageInfo`.
#[no_mangle]
pub unsafe extern "C" fn tessel_decode_memory(
    data: *const u8,
    len: usize,
    out_info: *mut TesselImageInfo,
) -> u64 {
    guarded("tessel_decode_memory", 0, || {
        if data.is_null() {
            return Err(FfiError::NullPointer("data"));
        }
        let bytes = unsafe { slice::from_raw_parts(data, len) };
        let image = Decoder::new().decode_memory(bytes)?;
        unsafe { register(image, out_info) }
    })
}

/// Reads a borrowed descriptor with `pread`, starting at offset 0
#[cfg(unix)]
struct PositionalReader {
    fd: c_int,
    offset: u64,
}

#[cfg(unix)]
impl std::io::Read for PositionalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let offset = libc::off_t::try_from(self.offset)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
        let read = unsafe { libc::pread(self.fd, buf.as_mut_ptr().cast(), buf.len(), offset) };
        if read < 0 {
            return Err(std::io::Error::last_os_error());
        }
        self.offset += read as u64;
        Ok(read as usize)
    }
}

/// Decodes the whole content of `fd`, from offset 0.
/// The descriptor is borrowed: it is left open and its file offset is not
/// moved. It must support positioned reads (a regular file, not a pipe).
/// Returns an image handle, or 0 on failure.
///
/// # Safety
/// `out_info` must be null or point to writable storage for a
/// `TesselImageInfo`.
#[cfg(unix)]
#[no_mangle]
pub unsafe extern "C" fn tessel_decode_fd(fd: c_int, out_info: *mut TesselImageInfo) -> u64 {
    guarded("tessel_decode_fd", 0, || {
        let image = Decoder::new().decode_reader(PositionalReader { fd, offset: 0 })?;
        unsafe { register(image, out_info) }
    })
}

/// Wraps `width * height` tightly packed RGBA8 pixels (copied) as an image.
/// Returns an image handle, or 0 on failure.
///
/// # Safety
/// `pixels` must point to `width * height * 4` readable bytes; `out_info`
/// must be null or point to writable storage for a `TesselImageInfo`.
#[no_mangle]
pub unsafe extern "C" fn tessel_create_from_pixels(
    width: u32,
    height: u32,
    pixels: *const u8,
    out_info: *mut TesselImageInfo,
) -> u64 {
    guarded("tessel_create_from_pixels", 0, || {
        if pixels.is_null() {
            return Err(FfiError::NullPointer("pixels"));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .ok_or(tessel_core::Error::DimensionOverflow { width, height })?;
        let bytes = unsafe { slice::from_raw_parts(pixels, len) };
        let image = Image::from_pixels(width, height, bytes.to_vec())?;
        unsafe { register(image, out_info) }
    })
}

/// Renders a region of the image's current frame into a host bitmap.
///
/// `dst` holds `dst_height` rows of `dst_stride` bytes. Regions are clipped
/// to both the frame and the bitmap; with `fill_blank`, parts of the region
/// not covered by the frame are painted `default_argb` (`0xAARRGGBB`).
/// Returns 0 on success, -1 on failure.
///
/// # Safety
/// `dst` must point to `dst_stride * dst_height` writable bytes that nothing
/// else accesses during the call.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn tessel_render(
    handle: u64,
    src_x: i32,
    src_y: i32,
    dst: *mut u8,
    dst_width: u32,
    dst_height: u32,
    dst_stride: u32,
    dst_x: i32,
    dst_y: i32,
    width: i32,
    height: i32,
    fill_blank: bool,
    default_argb: u32,
) -> c_int {
    guarded("tessel_render", -1, || {
        if dst.is_null() {
            return Err(FfiError::NullPointer("dst"));
        }
        let len = (dst_stride as usize)
            .checked_mul(dst_height as usize)
            .ok_or(tessel_core::Error::DimensionOverflow {
                width: dst_width,
                height: dst_height,
            })?;
        let bytes = unsafe { slice::from_raw_parts_mut(dst, len) };
        let surface = SurfaceMut::new(bytes, dst_width, dst_height, dst_stride)?;

        let mut request = RenderRequest::new(src_x, src_y, width, height).at(dst_x, dst_y);
        if fill_blank {
            request = request.fill_blank(Rgba::from_argb(default_argb));
        }

        let image = shared(handle)?;
        render_to_surface(&read(&image), surface, &request);
        Ok(0)
    })
}

/// Renders a tile of the image's current frame into the scratch buffer and
/// passes it to `upload`.
///
/// Returns 1 when a tile was uploaded, 0 when the tile is empty or larger
/// than the scratch buffer (nothing is rendered), -1 on failure.
///
/// # Safety
/// `upload` must be safe to call with `user_data` and must not call back
/// into this library.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn tessel_render_tile(
    handle: u64,
    init: bool,
    src_x: i32,
    src_y: i32,
    width: i32,
    height: i32,
    upload: Option<TesselUploadFn>,
    user_data: *mut c_void,
) -> c_int {
    guarded("tessel_render_tile", -1, || {
        let upload = upload.ok_or(FfiError::NullPointer("upload"))?;
        let request = TileRequest::new(src_x, src_y, width, height).init(init);

        // Lock order: image, then tiles
        let image = shared(handle)?;
        let locked = read(&image);
        let mut tiles = tiles();
        let renderer = tiles.as_mut().ok_or(FfiError::NotInitialized)?;

        let Some(tile) = renderer.render_tile(&locked, &request) else {
            return Ok(0);
        };
        drop(locked);

        let bytes = tile.bytes();
        unsafe {
            upload(
                user_data,
                tile.init,
                tile.width,
                tile.height,
                bytes.as_ptr(),
                bytes.len(),
            )
        };
        Ok(1)
    })
}

/// Steps an animated image to its next frame; no-op on static images.
/// Returns 0 on success, -1 on failure.
#[no_mangle]
pub extern "C" fn tessel_advance(handle: u64) -> c_int {
    guarded("tessel_advance", -1, || {
        write(&shared(handle)?).advance();
        Ok(0)
    })
}

/// Delay of the current frame in milliseconds (0 for static images),
/// or -1 on failure.
#[no_mangle]
pub extern "C" fn tessel_get_delay(handle: u64) -> i64 {
    guarded("tessel_get_delay", -1, || {
        Ok(read(&shared(handle)?).delay_ms() as i64)
    })
}

/// 1 if every pixel of the first frame is fully opaque, 0 if not,
/// -1 on failure.
#[no_mangle]
pub extern "C" fn tessel_is_opaque(handle: u64) -> c_int {
    guarded("tessel_is_opaque", -1, || {
        Ok(read(&shared(handle)?).is_opaque() as c_int)
    })
}

/// Frees the image. The handle becomes invalid, also for a second release.
/// A call still using the image on another thread finishes first, then the
/// image is freed.
/// Returns 0 on success, -1 on failure.
#[no_mangle]
pub extern "C" fn tessel_release(handle: u64) -> c_int {
    guarded("tessel_release", -1, || {
        let (image, live) = {
            let mut images = images();
            let image = images.remove(handle)?;
            (image, images.len())
        };
        if let Ok(lock) = Arc::try_unwrap(image) {
            lock.into_inner().unwrap_or_else(PoisonError::into_inner).release();
        }
        tracing::debug!(handle, live, "released image");
        Ok(0)
    })
}

/// Message of the last failure on the calling thread, or null.
/// The string stays valid until the next failing call on this thread.
#[no_mangle]
pub extern "C" fn tessel_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(ptr::null(), |message| message.as_ptr())
    })
}
