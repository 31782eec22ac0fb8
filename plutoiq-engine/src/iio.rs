//! libiio backend. Linked from `build.rs` when the `libiio` feature is on.

use std::collections::HashSet;
use std::ffi::{CStr, CString, c_char, c_double, c_int, c_longlong, c_void};
use std::ptr;

use log::{debug, warn};

use crate::context::{AttrValue, ChannelRef, IioContext, Refill};
use crate::endpoint::Endpoint;
use crate::{Errno, Error};

#[repr(C)]
struct IioCtx {
    _private: [u8; 0],
}
#[repr(C)]
struct IioDevice {
    _private: [u8; 0],
}
#[repr(C)]
struct IioChannel {
    _private: [u8; 0],
}
#[repr(C)]
struct IioBuffer {
    _private: [u8; 0],
}

unsafe extern "C" {
    fn iio_create_context_from_uri(uri: *const c_char) -> *mut IioCtx;
    fn iio_context_destroy(ctx: *mut IioCtx);
    fn iio_context_find_device(ctx: *const IioCtx, name: *const c_char) -> *mut IioDevice;
    fn iio_device_find_channel(
        dev: *const IioDevice,
        name: *const c_char,
        output: bool,
    ) -> *mut IioChannel;
    fn iio_channel_attr_write(
        chn: *const IioChannel,
        attr: *const c_char,
        src: *const c_char,
    ) -> isize;
    fn iio_channel_attr_write_longlong(
        chn: *const IioChannel,
        attr: *const c_char,
        val: c_longlong,
    ) -> c_int;
    fn iio_channel_attr_write_double(
        chn: *const IioChannel,
        attr: *const c_char,
        val: c_double,
    ) -> c_int;
    fn iio_channel_attr_read(
        chn: *const IioChannel,
        attr: *const c_char,
        dst: *mut c_char,
        len: usize,
    ) -> isize;
    fn iio_channel_attr_read_longlong(
        chn: *const IioChannel,
        attr: *const c_char,
        val: *mut c_longlong,
    ) -> c_int;
    fn iio_channel_attr_read_double(
        chn: *const IioChannel,
        attr: *const c_char,
        val: *mut c_double,
    ) -> c_int;
    fn iio_channel_enable(chn: *mut IioChannel);
    fn iio_channel_disable(chn: *mut IioChannel);
    fn iio_device_create_buffer(
        dev: *const IioDevice,
        samples_count: usize,
        cyclic: bool,
    ) -> *mut IioBuffer;
    fn iio_buffer_destroy(buf: *mut IioBuffer);
    fn iio_buffer_refill(buf: *mut IioBuffer) -> isize;
    fn iio_buffer_start(buf: *const IioBuffer) -> *mut c_void;
}

fn cstring(s: &str) -> Result<CString, Errno> {
    CString::new(s).map_err(|_| Errno::EINVAL)
}

/// Live buffer plus the number of `i16` words it holds.
struct StreamBuffer {
    raw: *mut IioBuffer,
    words: usize,
}

/// Device context opened through libiio.
pub struct LibiioContext {
    ctx: *mut IioCtx,
    buffer: Option<StreamBuffer>,
    enabled: HashSet<ChannelRef>,
}

// The context is only ever used from the thread that owns the source.
unsafe impl Send for LibiioContext {}

impl LibiioContext {
    pub fn open(endpoint: &Endpoint) -> Result<Self, Error> {
        let uri = endpoint.to_string();
        let c_uri = CString::new(uri.as_str()).map_err(|_| Error::Endpoint {
            endpoint: uri.clone(),
            reason: "contains a NUL byte",
        })?;

        let ctx = unsafe { iio_create_context_from_uri(c_uri.as_ptr()) };
        if ctx.is_null() {
            return Err(Error::ContextUnavailable {
                endpoint: uri,
                source: Errno::last_os_error(),
            });
        }

        debug!("libiio context opened at {}", uri);
        Ok(Self {
            ctx,
            buffer: None,
            enabled: HashSet::new(),
        })
    }

    fn device(&self, name: &str) -> Result<*mut IioDevice, Errno> {
        let name = cstring(name)?;
        let dev = unsafe { iio_context_find_device(self.ctx, name.as_ptr()) };
        if dev.is_null() {
            Err(Errno::ENODEV)
        } else {
            Ok(dev)
        }
    }

    fn channel(&self, chan: ChannelRef) -> Result<*mut IioChannel, Errno> {
        let dev = self.device(chan.device)?;
        let name = cstring(chan.channel)?;
        let chn = unsafe { iio_device_find_channel(dev, name.as_ptr(), chan.output) };
        if chn.is_null() {
            Err(Errno::ENODEV)
        } else {
            Ok(chn)
        }
    }
}

fn check(ret: i64) -> Result<(), Errno> {
    if ret < 0 {
        Err(Errno::from_ret(ret))
    } else {
        Ok(())
    }
}

impl IioContext for LibiioContext {
    fn write_attr(
        &mut self,
        chan: ChannelRef,
        attr: &str,
        value: AttrValue<'_>,
    ) -> Result<(), Errno> {
        let chn = self.channel(chan)?;
        let attr = cstring(attr)?;
        let ret = match value {
            AttrValue::Str(s) => {
                let s = cstring(s)?;
                unsafe { iio_channel_attr_write(chn, attr.as_ptr(), s.as_ptr()) as i64 }
            }
            AttrValue::Int(v) => unsafe {
                i64::from(iio_channel_attr_write_longlong(chn, attr.as_ptr(), v))
            },
            AttrValue::Float(v) => unsafe {
                i64::from(iio_channel_attr_write_double(chn, attr.as_ptr(), v))
            },
        };
        check(ret)
    }

    fn read_attr_i64(&self, chan: ChannelRef, attr: &str) -> Result<i64, Errno> {
        let chn = self.channel(chan)?;
        let attr = cstring(attr)?;
        let mut value: c_longlong = 0;
        check(i64::from(unsafe {
            iio_channel_attr_read_longlong(chn, attr.as_ptr(), &mut value)
        }))?;
        Ok(value)
    }

    fn read_attr_f64(&self, chan: ChannelRef, attr: &str) -> Result<f64, Errno> {
        let chn = self.channel(chan)?;
        let attr = cstring(attr)?;
        let mut value: c_double = 0.0;
        check(i64::from(unsafe {
            iio_channel_attr_read_double(chn, attr.as_ptr(), &mut value)
        }))?;
        Ok(value)
    }

    fn read_attr_str(&self, chan: ChannelRef, attr: &str) -> Result<String, Errno> {
        let chn = self.channel(chan)?;
        let attr = cstring(attr)?;
        let mut buf = [0 as c_char; 256];
        let ret =
            unsafe { iio_channel_attr_read(chn, attr.as_ptr(), buf.as_mut_ptr(), buf.len()) };
        check(ret as i64)?;
        let text = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(text.to_string_lossy().trim().to_string())
    }

    fn enable_channel(&mut self, chan: ChannelRef) -> Result<(), Errno> {
        let chn = self.channel(chan)?;
        unsafe { iio_channel_enable(chn) };
        self.enabled.insert(chan);
        Ok(())
    }

    fn disable_channel(&mut self, chan: ChannelRef) {
        match self.channel(chan) {
            Ok(chn) => {
                unsafe { iio_channel_disable(chn) };
                self.enabled.remove(&chan);
            }
            Err(e) => warn!("cannot disable {}/{}: {}", chan.device, chan.channel, e),
        }
    }

    fn create_buffer(&mut self, device: &str, samples: usize) -> Result<(), Errno> {
        if self.buffer.is_some() {
            return Err(Errno::EBUSY);
        }
        let dev = self.device(device)?;
        let raw = unsafe { iio_device_create_buffer(dev, samples, false) };
        if raw.is_null() {
            return Err(Errno::last_os_error());
        }
        self.buffer = Some(StreamBuffer {
            raw,
            words: samples * self.enabled.len().max(1),
        });
        Ok(())
    }

    fn destroy_buffer(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            unsafe { iio_buffer_destroy(buffer.raw) };
        }
    }

    fn refill(&mut self) -> Result<Refill<'_>, Errno> {
        let buffer = self.buffer.as_ref().ok_or(Errno::EBADF)?;
        let ret = unsafe { iio_buffer_refill(buffer.raw) };
        check(ret as i64)?;

        let start = unsafe { iio_buffer_start(buffer.raw) } as *const i16;
        if start.is_null() {
            return Err(Errno::EIO);
        }
        // Valid until the next refill or destroy, both of which need `&mut self`.
        let samples = unsafe { std::slice::from_raw_parts(start, buffer.words) };
        Ok(Refill {
            bytes: ret as usize,
            samples,
        })
    }
}

impl Drop for LibiioContext {
    fn drop(&mut self) {
        self.destroy_buffer();
        if !self.ctx.is_null() {
            unsafe { iio_context_destroy(self.ctx) };
            self.ctx = ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_maps_negative_errno() {
        assert_eq!(check(-5), Err(Errno::EIO));
        assert_eq!(check(0), Ok(()));
        assert_eq!(check(4096), Ok(()));
    }

    #[test]
    fn test_cstring_rejects_nul() {
        assert_eq!(cstring("a\0b").err(), Some(Errno::EINVAL));
    }
}
