use ndarray::Array2;

/// One captured grayscale frame, indexed `[row, col]`
pub struct Frame {
    pub id: u64,
    pub image: Array2<u8>,
    pub timestamp: f64, // in seconds since epoch
}

impl Frame {
    pub fn new(id: u64, image: Array2<u8>) -> Self {
        Self {
            id,
            image,
            timestamp: crate::envelope::now_secs(),
        }
    }

    /// (width, height)
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        let (rows, cols) = self.image.dim();
        (cols as u32, rows as u32)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}
