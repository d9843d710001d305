//! In-memory image store. One per server process; CLEAR empties it, SEND
//! and LIST read it by zero-based index, CAPTURE appends to it.

use crate::camera::CapturedImage;
use crate::error::ArgumentError;

#[derive(Default)]
pub struct ImageStore {
    images: Vec<CapturedImage>,
}

impl ImageStore {
    pub fn new() -> Self {
        ImageStore { images: Vec::new() }
    }

    pub fn append(&mut self, mut images: Vec<CapturedImage>) {
        self.images.append(&mut images);
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn list(&self) -> &[CapturedImage] {
        &self.images
    }

    pub fn get(&self, index: usize) -> Result<&CapturedImage, ArgumentError> {
        self.images
            .get(index)
            .ok_or(ArgumentError::IndexOutOfBounds { index, len: self.images.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(ts: f64) -> CapturedImage {
        CapturedImage { timestamp: ts, bytes: vec![0u8; 4] }
    }

    #[test]
    fn append_preserves_order_and_grows_index() {
        let mut store = ImageStore::new();
        store.append(vec![image(1.0)]);
        store.append(vec![image(2.0), image(3.0)]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(2).unwrap().timestamp, 3.0);
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = ImageStore::new();
        store.append(vec![image(1.0)]);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        let store = ImageStore::new();
        assert!(matches!(store.get(0), Err(ArgumentError::IndexOutOfBounds { index: 0, len: 0 })));
    }
}
