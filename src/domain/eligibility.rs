use std::cmp::Ordering;

use chrono::NaiveDate;
use tracing::{debug, info};

use super::error::Denial;
use super::platform::PlatformRecord;
use super::validation::DATE_FORMAT;

/// Decide whether `capsule` may be applied on top of `current`.
///
/// Identity is checked first (manufacturer, product, vendor); only a capsule
/// that targets this exact platform gets its release date compared.
pub fn check_eligible(current: &PlatformRecord, capsule: &PlatformRecord) -> Result<(), Denial> {
    check_identity(current, capsule)?;
    check_recency(current, capsule)
}

fn check_identity(current: &PlatformRecord, capsule: &PlatformRecord) -> Result<(), Denial> {
    if capsule.manufacturer != current.manufacturer {
        debug!(
            capsule = %capsule.manufacturer,
            platform = %current.manufacturer,
            "manufacturer mismatch"
        );
        return Err(Denial::ManufacturerMismatch);
    }
    if capsule.product != current.product {
        debug!(capsule = %capsule.product, platform = %current.product, "product mismatch");
        return Err(Denial::ProductMismatch);
    }
    if capsule.vendor != current.vendor {
        debug!(capsule = %capsule.vendor, platform = %current.vendor, "vendor mismatch");
        return Err(Denial::VendorMismatch);
    }
    debug!("manufacturer/product check passed");
    Ok(())
}

fn check_recency(current: &PlatformRecord, capsule: &PlatformRecord) -> Result<(), Denial> {
    let parse = |date: &str| NaiveDate::parse_from_str(date, DATE_FORMAT);
    let (Ok(installed), Ok(candidate)) = (parse(&current.release_date), parse(&capsule.release_date))
    else {
        return Err(Denial::InvalidReleaseDate);
    };

    match candidate.cmp(&installed) {
        Ordering::Greater => {
            info!(
                current_date = %current.release_date,
                current_vendor = %current.vendor,
                current_manufacturer = %current.manufacturer,
                current_product = %current.product,
                capsule_date = %capsule.release_date,
                "capsule is newer than installed firmware"
            );
            Ok(())
        }
        Ordering::Equal => {
            debug!(date = %current.release_date, "firmware already applied");
            Err(Denial::AlreadyApplied)
        }
        Ordering::Less => {
            info!(
                current_date = %current.release_date,
                capsule_date = %capsule.release_date,
                "capsule is older than installed firmware"
            );
            Err(Denial::OlderThanInstalled)
        }
    }
}
