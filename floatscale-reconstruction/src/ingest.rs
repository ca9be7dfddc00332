//! Sample ingestion
//!
//! Turns raw [`PointRecord`]s into [`Sample`]s: validates positions, normals,
//! scales and confidences, applies the scale factor and then the
//! `min_scale`/`max_scale` policy.

use floatscale_core::{Error, PointRecord, Result, Sample};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use tracing::trace;

/// Scale policy applied to every ingested record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleOptions {
    /// Multiplies every sample scale
    pub scale_factor: f32,
    /// Smaller scales are clamped up to this value
    pub min_scale: f32,
    /// Samples with a larger scale are dropped
    pub max_scale: f32,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            min_scale: 0.0,
            max_scale: f32::INFINITY,
        }
    }
}

impl SampleOptions {
    pub fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_min_scale(mut self, min_scale: f32) -> Self {
        self.min_scale = min_scale;
        self
    }

    pub fn with_max_scale(mut self, max_scale: f32) -> Self {
        self.max_scale = max_scale;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "scale factor must be positive and finite, got {}",
                self.scale_factor
            )));
        }
        if !(self.min_scale.is_finite() && self.min_scale >= 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "minimum scale must be non-negative, got {}",
                self.min_scale
            )));
        }
        if self.max_scale.is_nan() || self.max_scale <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "maximum scale must be positive, got {}",
                self.max_scale
            )));
        }
        if self.min_scale > self.max_scale {
            return Err(Error::InvalidConfiguration(format!(
                "minimum scale {} exceeds maximum scale {}",
                self.min_scale, self.max_scale
            )));
        }
        Ok(())
    }

    /// Apply the min/max policy to an already scaled value.
    ///
    /// Returns `None` when the sample must be dropped. Applying the policy
    /// to its own output returns the same value.
    pub fn clamp_scale(&self, scale: f32) -> Option<f32> {
        if scale > self.max_scale {
            None
        } else {
            Some(scale.max(self.min_scale))
        }
    }
}

/// Outcome of ingesting a single record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ingested {
    Accepted { sample: Sample, clamped: bool },
    /// Scale exceeded `max_scale`
    Rejected,
}

/// Convert one record into a sample.
///
/// Records that cannot be turned into a sample yield
/// [`Error::MalformedInput`].
pub fn ingest_record(record: &PointRecord, options: &SampleOptions) -> Result<Ingested> {
    let position = record.position;
    if !position.coords.iter().all(|c| c.is_finite()) {
        return Err(Error::MalformedInput(format!(
            "non-finite position {:?}",
            position
        )));
    }

    let normal = record
        .normal
        .ok_or_else(|| Error::MalformedInput("missing normal".to_string()))?;
    let length = normal.norm();
    if !(length.is_finite() && length > 0.0) {
        return Err(Error::MalformedInput(format!(
            "normal {:?} cannot be normalized",
            normal
        )));
    }

    let raw_scale = record
        .scale
        .ok_or_else(|| Error::MalformedInput("missing scale".to_string()))?;
    let scaled = raw_scale * options.scale_factor;
    if !(scaled.is_finite() && scaled > 0.0) {
        return Err(Error::MalformedInput(format!(
            "scale {} is not positive",
            raw_scale
        )));
    }

    let confidence = record.confidence.unwrap_or(1.0);
    if !(confidence.is_finite() && confidence >= 0.0) {
        return Err(Error::MalformedInput(format!(
            "confidence {} is negative",
            confidence
        )));
    }

    let Some(scale) = options.clamp_scale(scaled) else {
        return Ok(Ingested::Rejected);
    };

    let mut sample = Sample::new(position, normal / length, scale).with_confidence(confidence);
    sample.color = record.color;

    Ok(Ingested::Accepted {
        sample,
        clamped: scale != scaled,
    })
}

/// Counters collected while ingesting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub records_seen: usize,
    pub samples_accepted: usize,
    pub malformed_skipped: usize,
    pub scales_clamped: usize,
    pub rejected_max_scale: usize,
}

impl AddAssign for IngestStats {
    fn add_assign(&mut self, other: Self) {
        self.records_seen += other.records_seen;
        self.samples_accepted += other.samples_accepted;
        self.malformed_skipped += other.malformed_skipped;
        self.scales_clamped += other.scales_clamped;
        self.rejected_max_scale += other.rejected_max_scale;
    }
}

/// Stateful ingestion that counts every outcome
#[derive(Debug, Clone)]
pub struct Ingestor {
    options: SampleOptions,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new(options: SampleOptions) -> Self {
        Self {
            options,
            stats: IngestStats::default(),
        }
    }

    /// Ingest a record, returning the sample if it was accepted
    pub fn ingest(&mut self, record: &PointRecord) -> Option<Sample> {
        self.stats.records_seen += 1;
        match ingest_record(record, &self.options) {
            Ok(Ingested::Accepted { sample, clamped }) => {
                self.stats.samples_accepted += 1;
                if clamped {
                    self.stats.scales_clamped += 1;
                }
                Some(sample)
            }
            Ok(Ingested::Rejected) => {
                self.stats.rejected_max_scale += 1;
                None
            }
            Err(e) => {
                trace!("Skipping record {}: {}", self.stats.records_seen - 1, e);
                self.stats.malformed_skipped += 1;
                None
            }
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn options(&self) -> &SampleOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use floatscale_core::{Point3f, Vector3f};

    fn record(scale: f32) -> PointRecord {
        PointRecord::new(Point3f::new(1.0, 2.0, 3.0), Vector3f::new(0.0, 0.0, 2.0), scale)
    }

    #[test]
    fn test_accepts_and_normalizes() {
        let result = ingest_record(&record(0.5), &SampleOptions::default()).unwrap();
        let Ingested::Accepted { sample, clamped } = result else {
            panic!("expected accepted sample");
        };
        assert!(!clamped);
        assert_relative_eq!(sample.normal, Vector3f::z(), epsilon = 1e-6);
        assert_eq!(sample.scale, 0.5);
        assert_eq!(sample.confidence, 1.0);
        assert!(sample.color.is_none());
    }

    #[test]
    fn test_scale_policy() {
        let options = SampleOptions::default()
            .with_scale_factor(2.0)
            .with_min_scale(1.5)
            .with_max_scale(4.0);

        match ingest_record(&record(0.5), &options).unwrap() {
            Ingested::Accepted { sample, clamped } => {
                assert!(clamped);
                assert_eq!(sample.scale, 1.5);
            }
            other => panic!("unexpected {:?}", other),
        }
        match ingest_record(&record(1.0), &options).unwrap() {
            Ingested::Accepted { sample, clamped } => {
                assert!(!clamped);
                assert_eq!(sample.scale, 2.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            ingest_record(&record(2.5), &options).unwrap(),
            Ingested::Rejected
        );
    }

    #[test]
    fn test_clamping_is_idempotent() {
        let options = SampleOptions::default()
            .with_min_scale(0.25)
            .with_max_scale(8.0);
        for i in 0..200 {
            let scale = i as f32 * 0.05;
            if let Some(once) = options.clamp_scale(scale) {
                assert_eq!(options.clamp_scale(once), Some(once));
                assert!(once >= options.min_scale && once <= options.max_scale);
            } else {
                assert!(scale > options.max_scale);
            }
        }
    }

    #[test]
    fn test_malformed_records() {
        let options = SampleOptions::default();
        let mut bad = vec![
            PointRecord {
                normal: None,
                ..record(1.0)
            },
            PointRecord {
                scale: None,
                ..record(1.0)
            },
            PointRecord {
                normal: Some(Vector3f::zeros()),
                ..record(1.0)
            },
            PointRecord {
                position: Point3f::new(f32::NAN, 0.0, 0.0),
                ..record(1.0)
            },
            record(0.0),
            record(-1.0),
        ];
        bad.push(record(1.0).with_confidence(-0.5));

        for r in &bad {
            assert!(
                matches!(ingest_record(r, &options), Err(Error::MalformedInput(_))),
                "record {:?} should be malformed",
                r
            );
        }
    }

    #[test]
    fn test_ingestor_counts() {
        let options = SampleOptions::default().with_min_scale(0.5).with_max_scale(2.0);
        let mut ingestor = Ingestor::new(options);
        let records = [
            record(1.0),
            record(0.1),
            record(3.0),
            PointRecord {
                normal: None,
                ..record(1.0)
            },
            record(1.0).with_confidence(0.0).with_color([0.5, 0.5, 0.5]),
        ];
        let accepted: Vec<_> = records.iter().filter_map(|r| ingestor.ingest(r)).collect();

        assert_eq!(accepted.len(), 3);
        assert_eq!(accepted[2].confidence, 0.0);
        assert_eq!(accepted[2].color, Some([0.5, 0.5, 0.5]));
        assert_eq!(
            ingestor.stats(),
            IngestStats {
                records_seen: 5,
                samples_accepted: 3,
                malformed_skipped: 1,
                scales_clamped: 1,
                rejected_max_scale: 1,
            }
        );
    }

    #[test]
    fn test_validate_options() {
        assert!(SampleOptions::default().validate().is_ok());
        assert!(SampleOptions::default().with_scale_factor(0.0).validate().is_err());
        assert!(SampleOptions::default().with_min_scale(-1.0).validate().is_err());
        assert!(SampleOptions::default().with_max_scale(0.0).validate().is_err());
        assert!(SampleOptions::default()
            .with_min_scale(2.0)
            .with_max_scale(1.0)
            .validate()
            .is_err());
    }
}
