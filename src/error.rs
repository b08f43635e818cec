use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Capture Error: {0}")]
    Capture(String),

    #[error("Foreground Error: {0}")]
    Foreground(String),

    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config Error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image Shape Error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn shape_errors_are_not_capture_errors() {
        let err: Error = Array2::<u8>::from_shape_vec((2, 2), vec![0; 3])
            .unwrap_err()
            .into();

        assert!(matches!(err, Error::Shape(_)));
    }
}
