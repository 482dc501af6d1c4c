//! Common test fixtures for raster tests.
//!
//! Pre-defined cube extents and helpers for writing raw cube files with
//! headers and line padding.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Common cube extents for testing.
pub mod cube {
    /// 4 rows × 4 columns × 2 bands
    pub const SMALL: CubeSpec = CubeSpec {
        rows: 4,
        columns: 4,
        bands: 2,
    };

    /// 10 rows × 1 column × 1 band
    pub const TALL_SINGLE_BAND: CubeSpec = CubeSpec {
        rows: 10,
        columns: 1,
        bands: 1,
    };

    /// Uneven extent that exposes row/column mix-ups
    pub const ODD: CubeSpec = CubeSpec {
        rows: 7,
        columns: 5,
        bands: 3,
    };

    /// Large enough for several statistics workers
    pub const STATISTICS: CubeSpec = CubeSpec {
        rows: 64,
        columns: 48,
        bands: 2,
    };

    /// Cube extent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CubeSpec {
        pub rows: usize,
        pub columns: usize,
        pub bands: usize,
    }

    impl CubeSpec {
        /// Number of elements in the cube.
        pub fn size(&self) -> usize {
            self.rows * self.columns * self.bands
        }
    }
}

/// Raw cube file with a header and per-line padding, in a temp directory
/// that lives as long as the fixture.
pub struct RawCubeFile {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl RawCubeFile {
    /// Write `lines` of cube data, each followed by `interline` zero bytes,
    /// after `header` bytes of 0xFF.
    pub fn write(name: &str, header: usize, lines: &[&[u8]], interline: usize) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(name);
        let mut file = File::create(&path)?;

        file.write_all(&vec![0xFF; header])?;
        for line in lines {
            file.write_all(line)?;
            file.write_all(&vec![0; interline])?;
        }
        file.sync_all()?;

        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
