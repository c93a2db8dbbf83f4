pub trait Unique {
    fn all_unique(self) -> bool;
}

impl<T: Clone + Iterator<Item = I>, I: PartialEq> Unique for T {
    fn all_unique(mut self) -> bool {
        // O(n^2). Tables are small and there is no heap for a hash set.
        while let Some(element) = self.next() {
            if self.clone().any(|e| e == element) {
                return false;
            }
        }
        true
    }
}

pub trait CollectSlice: Iterator {
    /// Collects an iterator into a given slice, returning the number of collected items.
    fn collect_slice(&mut self, slice: &mut [Self::Item]) -> usize;
}

impl<I: Iterator> CollectSlice for I {
    fn collect_slice(&mut self, slice: &mut [Self::Item]) -> usize {
        slice.iter_mut().zip(self).fold(0, |count, (dest, item)| {
            *dest = item;
            count + 1
        })
    }
}
