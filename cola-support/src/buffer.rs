/// An owned, fixed-element-type buffer with one spare trailing slot.
///
/// The COLA merge engine reads a level's tail into a buffer it then shrinks
/// in place (see the core's `read_level`); the trailing slot is reserved for
/// the merge engine's own sentinel use and is never populated by a read.
/// Modeling this as a plain owned `Vec` (instead of a raw `alloc`/`free` pair)
/// means the buffer is released automatically at the end of its scope on
/// every exit path, including an early `?` return.
#[derive(Debug, Clone)]
pub struct SlabBuffer<T: Default + Clone> {
    items: Vec<T>,
}

impl<T: Default + Clone> SlabBuffer<T> {
    /// Allocates a buffer able to hold `n` real items plus one sentinel slot.
    pub fn with_capacity(n: usize) -> Self {
        SlabBuffer {
            items: vec![T::default(); n + 1],
        }
    }

    /// The real (non-sentinel) portion of the buffer.
    pub fn as_mut_slice(&mut self, n: usize) -> &mut [T] {
        &mut self.items[..n]
    }

    pub fn as_slice(&self, n: usize) -> &[T] {
        &self.items[..n]
    }

    pub fn into_vec(mut self, n: usize) -> Vec<T> {
        self.items.truncate(n);
        self.items
    }
}

/// Sorts `items` ascending by the byte-string key extracted by `key_of`.
///
/// Insertion sort is deliberately used instead of a general-purpose sort:
/// the only caller is the COLA core's L0 read path, where `items` is bounded
/// by `L0_SIZE` and is usually already nearly sorted (recent inserts tend to
/// land near the end), which is exactly the case insertion sort is cheap for.
pub fn insertion_sort_by_key<T: Clone>(items: &mut [T], key_of: impl Fn(&T) -> &[u8]) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && key_of(&items[j - 1]) > key_of(&items[j]) {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slab_buffer_reserves_sentinel_slot() {
        let mut buf: SlabBuffer<u32> = SlabBuffer::with_capacity(3);
        let slice = buf.as_mut_slice(3);
        slice.copy_from_slice(&[1, 2, 3]);
        assert_eq!(buf.into_vec(3), vec![1, 2, 3]);
    }

    #[test]
    fn insertion_sort_sorts_ascending() {
        let mut items = vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()];
        insertion_sort_by_key(&mut items, |v| v.as_slice());
        assert_eq!(items, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn insertion_sort_is_stable() {
        let mut items = vec![(b"a".to_vec(), 1), (b"a".to_vec(), 2), (b"a".to_vec(), 3)];
        insertion_sort_by_key(&mut items, |(k, _)| k.as_slice());
        assert_eq!(items.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn insertion_sort_handles_empty_and_singleton() {
        let mut empty: Vec<Vec<u8>> = vec![];
        insertion_sort_by_key(&mut empty, |v| v.as_slice());
        assert!(empty.is_empty());

        let mut single = vec![b"x".to_vec()];
        insertion_sort_by_key(&mut single, |v| v.as_slice());
        assert_eq!(single, vec![b"x".to_vec()]);
    }
}
