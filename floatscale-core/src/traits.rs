//! Core traits for floatscale

use crate::{error::Result, point::*, point_cloud::*};

/// A restartable source of raw point records.
///
/// Every call to [`PointSource::records`] starts over from the first record,
/// which lets the pipeline make one pass to measure the input and a second
/// pass to insert it.
pub trait PointSource {
    /// Human readable name used in log messages
    fn name(&self) -> String;

    /// Open the source and iterate its records from the start
    fn records(&self) -> Result<Box<dyn Iterator<Item = PointRecord> + '_>>;
}

impl PointSource for RecordCloud {
    fn name(&self) -> String {
        format!("in-memory cloud ({} records)", self.len())
    }

    fn records(&self) -> Result<Box<dyn Iterator<Item = PointRecord> + '_>> {
        Ok(Box::new(self.points.iter().copied()))
    }
}
