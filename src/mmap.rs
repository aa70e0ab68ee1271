use std::marker::PhantomData;
use std::ptr;
use std::{mem, slice};

use libc::{c_void, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_EXEC, PROT_READ, PROT_WRITE};

use crate::error::{Error, Result};

/// Type-state marker: the region is readable and writable but not (yet) flipped to
/// executable through this handle.
pub struct ReadWritable;
/// Type-state marker: the region is executable.
pub struct Executable;

/// An anonymous, page-backed memory region used as the JIT's code buffer.
///
/// The region is owned as a raw pointer + length rather than a borrowed slice: `Drop`
/// munmaps it on teardown, and [`MemoryMap::set_executable`] needs to hand the same
/// pages to a differently-typed handle without moving a field out of a type that
/// implements `Drop` (`error[E0509]`). Because the pointer is `Copy`, `set_executable`
/// can build the new handle and then [`mem::forget`] the old one, so exactly one
/// `Drop` ever runs `munmap` on a given mapping.
///
/// The type parameter tracks whether the region is currently writable or executable,
/// so code cannot accidentally write into a region through a handle that has already
/// been flipped to executable. This maps directly onto the W^X transition a hardened
/// kernel would force; on the default W+X path the region already carries `PROT_EXEC`
/// from the initial mapping, so `set_executable` is a same-permission `mprotect` call
/// today, but it is the single call site a W^X-only host would need to change (map
/// without `PROT_EXEC`, then grant it only here).
pub struct MemoryMap<Mode = ReadWritable> {
    addr: *mut u8,
    len: usize,
    mode: PhantomData<Mode>,
}

impl MemoryMap<ReadWritable> {
    /// Maps a fresh, zero-filled, read+write+exec region of exactly `len` bytes.
    pub fn new(len: usize) -> Result<Self> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE | PROT_EXEC,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if addr == MAP_FAILED {
            return Err(Error::Mmap(std::io::Error::last_os_error()));
        }

        Ok(Self {
            addr: addr as *mut u8,
            len,
            mode: PhantomData,
        })
    }

    pub fn get_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.addr, self.len) }
    }

    /// Flips the region's protection to include execute permission, consuming the
    /// writable handle so no further writes can be issued through it.
    ///
    /// The new `Executable` handle is built from the same `addr`/`len` this handle
    /// owns; `self` is then [`mem::forget`]-ten (not dropped) so its `Drop` impl never
    /// runs — otherwise the mapping would be `munmap`ped here and again when the
    /// returned handle is dropped, a double free that also leaves the just-returned
    /// handle aliasing freed memory.
    pub fn set_executable(self) -> Result<MemoryMap<Executable>> {
        let addr = self.addr as *mut c_void;

        if unsafe { libc::mprotect(addr, self.len, PROT_READ | PROT_WRITE | PROT_EXEC) } == -1 {
            return Err(Error::Mprotect(std::io::Error::last_os_error()));
        }

        let executable = MemoryMap {
            addr: self.addr,
            len: self.len,
            mode: PhantomData,
        };
        mem::forget(self);
        Ok(executable)
    }
}

impl MemoryMap<Executable> {
    /// Casts the region to a `fn()` and calls it. The caller must have written a valid,
    /// self-contained x86-64 function (prologue through `ret`) starting at byte 0.
    ///
    /// # Safety
    /// The mapped bytes must form a valid function for the host calling convention and
    /// must not assume any register state beyond what the ABI guarantees on entry.
    pub unsafe fn execute(&self) {
        let entry = mem::transmute::<*mut u8, unsafe extern "C" fn()>(self.addr);
        entry();
    }
}

impl<Mode> Drop for MemoryMap<Mode> {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr as *mut c_void, self.len);
        }
    }
}
