//! Input validation utilities for capture and pointer parameters.
//!
//! Parses the compact string forms clients send (`"x,y,w,h"` areas and
//! `"w,h"` resize targets) and checks them against the display, with
//! descriptive error messages suitable for exposing to clients.

use anyhow::{anyhow, bail, Result};

use crate::capture::CaptureRegion;
use crate::provider::DisplayBounds;

/// Validates capture regions against the display.
#[derive(Debug)]
pub struct RegionValidator {
    bounds: DisplayBounds,
}

impl RegionValidator {
    /// Creates a new validator for a display of the given size.
    pub fn new(bounds: DisplayBounds) -> Self {
        Self { bounds }
    }

    /// Ensures the region is non-empty and lies entirely on the display.
    pub fn validate(&self, region: &CaptureRegion) -> Result<()> {
        if region.width == 0 || region.height == 0 {
            bail!("Width and height must be positive");
        }
        let right = region.left as u64 + region.width as u64;
        let bottom = region.top as u64 + region.height as u64;
        if right > self.bounds.width as u64 {
            bail!(
                "Region {} exceeds screen width {} (right edge: {})",
                region,
                self.bounds.width,
                right
            );
        }
        if bottom > self.bounds.height as u64 {
            bail!(
                "Region {} exceeds screen height {} (bottom edge: {})",
                region,
                self.bounds.height,
                bottom
            );
        }
        Ok(())
    }
}

/// Validates a JPEG quality value (1-100).
pub fn validate_quality(quality: i64) -> Result<u8> {
    if !(1..=100).contains(&quality) {
        bail!("Quality {} is out of range (1-100)", quality);
    }
    Ok(quality as u8)
}

fn parse_parts(value: &str, what: &str) -> Result<Vec<u32>> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| anyhow!("Invalid {} value '{}' in '{}'", what, part.trim(), value))
        })
        .collect()
}

/// Parses an `"x,y,w,h"` area. A string without exactly four parts means
/// "no area"; four parts that are not non-negative integers are an error.
pub fn parse_area(area: Option<&str>) -> Result<Option<CaptureRegion>> {
    let Some(area) = area.filter(|a| a.split(',').count() == 4) else {
        return Ok(None);
    };
    let parts = parse_parts(area, "area")?;
    Ok(Some(CaptureRegion::new(parts[0], parts[1], parts[2], parts[3])))
}

/// Parses a `"w,h"` resize target with the same rules as [`parse_area`].
pub fn parse_resize(resize: Option<&str>) -> Result<Option<(u32, u32)>> {
    let Some(resize) = resize.filter(|r| r.split(',').count() == 2) else {
        return Ok(None);
    };
    let parts = parse_parts(resize, "resize")?;
    if parts[0] == 0 || parts[1] == 0 {
        bail!("Resize dimensions must be positive: '{}'", resize);
    }
    Ok(Some((parts[0], parts[1])))
}
