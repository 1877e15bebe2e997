use std::marker::PhantomData;
use std::{mem, ptr, slice};

const WORD: usize = mem::size_of::<u64>();

/// Where we store all the intermediate values of recorded commands.
///
/// The storage is backed by 64-bit words, so every pushed slice starts on an
/// 8-byte boundary and can be viewed again as a `&[T]` for any `Copy` type whose
/// alignment is not larger than that.
#[derive(Clone, Debug, Default)]
pub struct DataBuffer(Vec<u64>);

impl DataBuffer {
    /// Creates a new and empty `DataBuffer`.
    pub fn new() -> Self {
        DataBuffer(Vec::new())
    }

    /// Creates a new buffer with specified capacity in bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        DataBuffer(Vec::with_capacity((capacity + WORD - 1) / WORD))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns the number of bytes in use, including padding.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len() * WORD
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Clones and appends all elements in a slice to the buffer.
    pub fn extend_from_slice<T>(&mut self, values: &[T]) -> DataBufferPtr<[T]>
    where
        T: Copy,
    {
        assert!(mem::align_of::<T>() <= WORD);

        let len = mem::size_of::<T>() * values.len();
        let words = (len + WORD - 1) / WORD;
        let position = self.0.len();
        self.0.resize(position + words, 0);

        unsafe {
            let dst = self.0.as_mut_ptr().add(position) as *mut u8;
            ptr::copy_nonoverlapping(values.as_ptr() as *const u8, dst, len);
        }

        DataBufferPtr {
            position: position as u32,
            len: values.len() as u32,
            _phantom: PhantomData,
        }
    }

    /// Returns a object slice indicated by `DataBufferPtr`.
    #[inline]
    pub fn as_slice<T>(&self, ptr: DataBufferPtr<[T]>) -> &[T]
    where
        T: Copy,
    {
        let bytes = mem::size_of::<T>() * ptr.len as usize;
        let words = (bytes + WORD - 1) / WORD;
        let position = ptr.position as usize;
        assert!(position + words <= self.0.len());

        unsafe {
            let src = self.0.as_ptr().add(position) as *const T;
            slice::from_raw_parts(src, ptr.len as usize)
        }
    }
}

/// A view into our `DataBuffer`, indicates where the objects are stored.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DataBufferPtr<T>
where
    T: ?Sized,
{
    position: u32,
    len: u32,
    _phantom: PhantomData<T>,
}

impl<T: ?Sized> DataBufferPtr<T> {
    /// The number of elements this pointer refers to.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T: ?Sized> Clone for DataBufferPtr<T> {
    fn clone(&self) -> Self {
        DataBufferPtr {
            position: self.position,
            len: self.len,
            _phantom: PhantomData,
        }
    }
}

impl<T: ?Sized> Copy for DataBufferPtr<T> {}
