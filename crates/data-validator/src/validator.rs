//! Range Checking for Sensor Readings

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Temperature valid range (°C), the physical domain of the probe
    pub temperature_range: (f64, f64),
    /// Relative humidity valid range (%)
    pub humidity_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            temperature_range: (-40.0, 125.0),
            humidity_range: (0.0, 100.0),
        }
    }
}

/// A reading that passed validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedReading {
    pub temperature: f64,
    pub humidity: f64,
}

/// Validator for incoming temperature/humidity readings
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range (inclusive)
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite(field));
        }
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate temperature
    pub fn validate_temperature(&self, temperature: f64) -> Result<(), ValidationError> {
        self.validate_range("temperature", temperature, self.config.temperature_range)
    }

    /// Validate humidity
    pub fn validate_humidity(&self, humidity: f64) -> Result<(), ValidationError> {
        self.validate_range("humidity", humidity, self.config.humidity_range)
    }

    /// Validate a raw ingress reading. Both fields are required.
    pub fn validate_reading(
        &self,
        temperature: Option<f64>,
        humidity: Option<f64>,
    ) -> Result<ValidatedReading, ValidationError> {
        let temperature = temperature.ok_or(ValidationError::MissingField("temperature"))?;
        let humidity = humidity.ok_or(ValidationError::MissingField("humidity"))?;

        self.validate_temperature(temperature)?;
        self.validate_humidity(humidity)?;

        debug!(temperature, humidity, "Reading validated");
        Ok(ValidatedReading {
            temperature,
            humidity,
        })
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_reading() {
        let validator = Validator::default();
        let reading = validator.validate_reading(Some(4.5), Some(61.0)).unwrap();
        assert_eq!(reading.temperature, 4.5);
        assert_eq!(reading.humidity, 61.0);
    }

    #[test]
    fn test_humidity_bounds() {
        let validator = Validator::default();
        assert!(validator.validate_humidity(0.0).is_ok());
        assert!(validator.validate_humidity(100.0).is_ok());
        assert!(validator.validate_humidity(-0.1).is_err());
        assert!(validator.validate_humidity(100.5).is_err());
    }

    #[test]
    fn test_missing_field() {
        let validator = Validator::default();
        assert_eq!(
            validator.validate_reading(None, Some(50.0)),
            Err(ValidationError::MissingField("temperature"))
        );
        assert_eq!(
            validator.validate_reading(Some(5.0), None),
            Err(ValidationError::MissingField("humidity"))
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let validator = Validator::default();
        assert_eq!(
            validator.validate_reading(Some(f64::NAN), Some(50.0)),
            Err(ValidationError::NotFinite("temperature"))
        );
        assert_eq!(
            validator.validate_reading(Some(5.0), Some(f64::INFINITY)),
            Err(ValidationError::NotFinite("humidity"))
        );
    }

    proptest! {
        #[test]
        fn humidity_outside_percent_is_rejected(h in prop_oneof![-1000.0..-0.001f64, 100.001..1000.0f64]) {
            let validator = Validator::default();
            let rejected = matches!(
                validator.validate_reading(Some(5.0), Some(h)),
                Err(ValidationError::OutOfRange { field: "humidity", .. })
            );
            prop_assert!(rejected);
        }

        #[test]
        fn in_domain_readings_pass(t in -40.0..=125.0f64, h in 0.0..=100.0f64) {
            let validator = Validator::default();
            prop_assert!(validator.validate_reading(Some(t), Some(h)).is_ok());
        }
    }
}
