//! Scheduled polling and measurement publishing.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use zenoh::Session;

use connector_common::serialization::{Format, encode};
use connector_common::{KeyExprBuilder, Measurement, MeasurementValue};

use crate::connector::ModbusConnector;
use crate::decoder::DecodedValue;
use crate::master::MasterFactory;
use crate::tag::TagWithData;

/// Drives a [`ModbusConnector`] on a fixed interval and publishes its output.
pub struct ModbusPoller<F> {
    connector: ModbusConnector<F>,
    interval: Duration,
    publisher: Publisher,
}

/// Publishes the measurements of one device.
struct Publisher {
    source: String,
    keys: KeyExprBuilder,
    session: Session,
    format: Format,
}

impl<F: MasterFactory> ModbusPoller<F> {
    /// Create a new poller for a connector.
    pub fn new(
        connector: ModbusConnector<F>,
        interval: Duration,
        key_prefix: &str,
        session: Session,
        format: Format,
    ) -> Self {
        let publisher = Publisher {
            source: connector.name().to_string(),
            keys: KeyExprBuilder::with_prefix(key_prefix),
            session,
            format,
        };

        Self {
            connector,
            interval,
            publisher,
        }
    }

    /// Run the polling loop until the shutdown signal is received, then
    /// close the device connection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting Modbus poller for device '{}' (interval: {:?})",
            self.publisher.source, self.interval
        );

        loop {
            let report = tokio::select! {
                report = self.connector.poll() => report,
                _ = shutdown.changed() => break,
            };

            let mut published = 0;
            for tagged in &report.data {
                if self.publisher.publish(tagged).await {
                    published += 1;
                }
            }

            if report.is_complete() {
                debug!(
                    "Device '{}': published {} measurements",
                    self.publisher.source, published
                );
            } else {
                warn!(
                    "Device '{}': published {} measurements, {} read failures, {} decode failures, {} registers skipped",
                    self.publisher.source,
                    published,
                    report.read_failures,
                    report.decode_failures,
                    report.skipped
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Stopping Modbus poller for device '{}'", self.publisher.source);
        self.connector.dispose().await;
    }
}

impl Publisher {
    /// Publish one tagged value. Returns `true` on success.
    async fn publish(&self, tagged: &TagWithData) -> bool {
        let key = self.keys.build(&self.source, &tagged.tag.key_path());
        let measurement = measurement_for(&self.source, tagged);

        match encode(&measurement, self.format) {
            Ok(payload) => match self.session.put(&key, payload).await {
                Ok(()) => {
                    debug!("Published: {} = {}", key, tagged.value);
                    true
                }
                Err(e) => {
                    warn!("Failed to publish to '{}': {}", key, e);
                    false
                }
            },
            Err(e) => {
                error!("Failed to encode measurement for '{}': {}", key, e);
                false
            }
        }
    }
}

impl From<DecodedValue> for MeasurementValue {
    fn from(value: DecodedValue) -> Self {
        match value {
            DecodedValue::Int16(v) => MeasurementValue::Integer(i64::from(v)),
            DecodedValue::Int32(v) => MeasurementValue::Integer(i64::from(v)),
            DecodedValue::UInt32(v) => MeasurementValue::Integer(i64::from(v)),
            DecodedValue::Float32(v) => MeasurementValue::Float(f64::from(v)),
            DecodedValue::Unsupported => MeasurementValue::Unsupported,
        }
    }
}

/// Build the measurement published for a tagged value.
///
/// NaN and infinite floats carry a `non_finite` label, since JSON writes them
/// as `null` like an unsupported value.
pub fn measurement_for(source: &str, tagged: &TagWithData) -> Measurement {
    let measurement = Measurement::new(source, tagged.tag.to_string(), tagged.value.into())
        .with_label("unit", tagged.tag.unit().to_string())
        .with_label("address", tagged.tag.address().to_string())
        .with_label("data_type", tagged.value.type_name());

    match tagged.value {
        DecodedValue::Float32(v) if !v.is_finite() => {
            measurement.with_label("non_finite", v.to_string())
        }
        _ => measurement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::TokioModbusFactory;
    use crate::tag::Tag;

    #[test]
    fn test_measurement_for_float() {
        let tagged = TagWithData::new(Tag::new(1, 0), DecodedValue::Float32(1.5));
        let m = measurement_for("meter01", &tagged);

        assert_eq!(m.source, "meter01");
        assert_eq!(m.tag, "1:0");
        assert_eq!(m.value, MeasurementValue::Float(1.5));
        assert_eq!(m.labels.get("unit"), Some(&"1".to_string()));
        assert_eq!(m.labels.get("address"), Some(&"0".to_string()));
        assert_eq!(m.labels.get("data_type"), Some(&"float".to_string()));
        assert!(!m.labels.contains_key("non_finite"));
    }

    #[test]
    fn test_non_finite_floats_are_labelled() {
        let nan = measurement_for(
            "meter01",
            &TagWithData::new(Tag::new(1, 0), DecodedValue::Float32(f32::NAN)),
        );
        assert!(matches!(nan.value, MeasurementValue::Float(v) if v.is_nan()));
        assert_eq!(nan.labels.get("non_finite"), Some(&"NaN".to_string()));

        let inf = measurement_for(
            "meter01",
            &TagWithData::new(Tag::new(1, 2), DecodedValue::Float32(f32::NEG_INFINITY)),
        );
        assert_eq!(inf.labels.get("non_finite"), Some(&"-inf".to_string()));

        // Unsupported values stay distinguishable from a NaN reading.
        let unsupported = measurement_for(
            "meter01",
            &TagWithData::new(Tag::new(1, 4), DecodedValue::Unsupported),
        );
        assert_eq!(unsupported.value, MeasurementValue::Unsupported);
        assert!(!unsupported.labels.contains_key("non_finite"));
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(
            MeasurementValue::from(DecodedValue::Int16(-7)),
            MeasurementValue::Integer(-7)
        );
        assert_eq!(
            MeasurementValue::from(DecodedValue::UInt32(u32::MAX)),
            MeasurementValue::Integer(4_294_967_295)
        );
        assert_eq!(
            MeasurementValue::from(DecodedValue::Unsupported),
            MeasurementValue::Unsupported
        );
    }

    #[test]
    fn test_key_for_tag() {
        let keys = KeyExprBuilder::with_prefix("timeseries/modbus");
        let tag = Tag::new(3, 40001);

        assert_eq!(
            keys.build("meter01", &tag.key_path()),
            "timeseries/modbus/meter01/3/40001"
        );
    }

    #[test]
    fn test_run_future_can_be_spawned() {
        fn assert_send<T: Send + 'static>(_: &T) {}

        fn check(poller: ModbusPoller<TokioModbusFactory>, shutdown: watch::Receiver<bool>) {
            let run = poller.run(shutdown);
            assert_send(&run);
        }

        let _ = check;
    }
}
