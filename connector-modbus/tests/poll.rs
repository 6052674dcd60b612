//! Poll-pass tests against a simulated device.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use connector_common::{Format, Measurement, MeasurementValue};

use connector_modbus::config::{ConnectorConfig, DeviceConfig, Protocol};
use connector_modbus::connection::ConnectionState;
use connector_modbus::connector::ModbusConnector;
use connector_modbus::decoder::DecodedValue;
use connector_modbus::endianness::Endianness;
use connector_modbus::error::{ConnectionError, MasterError, PollError};
use connector_modbus::master::{Endpoint, MasterFactory, ModbusMaster};
use connector_modbus::poller::ModbusPoller;
use connector_modbus::register::{DataType, FunctionCode, Register};
use connector_modbus::tag::Tag;

#[derive(Default)]
struct DeviceState {
    holding: HashMap<(u8, u16), u16>,
    input: HashMap<(u8, u16), u16>,
    /// Start addresses answered with an exception.
    rejected: HashSet<u16>,
    /// Start addresses answered with one word too few.
    truncated: HashSet<u16>,
    /// Break the transport on the next read.
    drop_next: bool,
    unreachable: bool,
    connects: usize,
    disconnects: usize,
    reads: usize,
}

#[derive(Clone, Default)]
struct SimDevice(Arc<Mutex<DeviceState>>);

impl SimDevice {
    fn set_holding(&self, unit: u8, address: u16, words: &[u16]) {
        let mut state = self.0.lock().unwrap();
        for (i, word) in words.iter().enumerate() {
            state.holding.insert((unit, address + i as u16), *word);
        }
    }

    fn set_input(&self, unit: u8, address: u16, words: &[u16]) {
        let mut state = self.0.lock().unwrap();
        for (i, word) in words.iter().enumerate() {
            state.input.insert((unit, address + i as u16), *word);
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }
}

struct SimMaster {
    device: SimDevice,
    connected: bool,
}

impl SimMaster {
    fn read(
        &mut self,
        input: bool,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, MasterError> {
        let mut state = self.device.0.lock().unwrap();
        state.reads += 1;

        if state.drop_next {
            state.drop_next = false;
            self.connected = false;
            return Err(MasterError::Transport(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }

        if state.rejected.contains(&address) {
            return Err(MasterError::Exception("IllegalDataAddress".to_string()));
        }

        let table = if input { &state.input } else { &state.holding };
        let mut count = count;
        if state.truncated.contains(&address) {
            count -= 1;
        }

        Ok((0..count)
            .map(|i| table.get(&(unit, address + i)).copied().unwrap_or(0))
            .collect())
    }
}

#[async_trait]
impl ModbusMaster for SimMaster {
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, MasterError> {
        self.read(false, unit, address, count)
    }

    async fn read_input_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, MasterError> {
        self.read(true, unit, address, count)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        self.device.with(|s| s.disconnects += 1);
    }
}

struct SimFactory(SimDevice);

#[async_trait]
impl MasterFactory for SimFactory {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ModbusMaster>, ConnectionError> {
        let mut state = self.0.0.lock().unwrap();
        if state.unreachable {
            return Err(ConnectionError::Io {
                endpoint: endpoint.address(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            });
        }

        state.connects += 1;
        Ok(Box::new(SimMaster {
            device: self.0.clone(),
            connected: true,
        }))
    }
}

fn register(
    unit: u8,
    starting_address: u16,
    size: u16,
    data_type: DataType,
    function_code: FunctionCode,
) -> Register {
    Register {
        unit,
        starting_address,
        size,
        data_type,
        function_code,
    }
}

fn device(endianness: Endianness, registers: Vec<Register>) -> DeviceConfig {
    DeviceConfig {
        name: "meter01".to_string(),
        connector: ConnectorConfig {
            ip: "127.0.0.1".to_string(),
            port: 502,
            endianness,
            protocol: Protocol::Tcp,
            use_ascii: false,
            timeout_ms: 1000,
            poll_interval_secs: 10,
        },
        registers,
    }
}

fn connector(
    sim: &SimDevice,
    endianness: Endianness,
    registers: Vec<Register>,
) -> ModbusConnector<SimFactory> {
    ModbusConnector::new(&device(endianness, registers), SimFactory(sim.clone()))
}

fn tags(data: &[connector_modbus::tag::TagWithData]) -> Vec<String> {
    data.iter().map(|d| d.tag.to_string()).collect()
}

#[tokio::test]
async fn test_float_register_end_to_end() {
    let sim = SimDevice::default();
    sim.set_holding(1, 0, &[0x4048, 0xF5C3]);

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![register(1, 0, 1, DataType::Float, FunctionCode::HoldingRegister)],
    );

    let report = connector.poll().await;
    assert!(report.is_complete());
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.data[0].tag.to_string(), "1:0");
    match report.data[0].value {
        DecodedValue::Float32(v) => assert!((v - 3.14).abs() < 1e-6),
        other => panic!("unexpected value: {:?}", other),
    }
    assert_eq!(connector.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_multi_element_register_tags() {
    let sim = SimDevice::default();
    sim.set_input(1, 100, &[10, 0xFFFF, 30]);

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![register(1, 100, 3, DataType::Int16, FunctionCode::InputRegister)],
    );

    let data = connector.get_all_data().await;
    assert_eq!(tags(&data), vec!["1:100", "1:101", "1:102"]);
    assert_eq!(
        data.iter().map(|d| d.value).collect::<Vec<_>>(),
        vec![
            DecodedValue::Int16(10),
            DecodedValue::Int16(-1),
            DecodedValue::Int16(30)
        ]
    );
}

#[tokio::test]
async fn test_failed_register_does_not_block_later_ones() {
    let sim = SimDevice::default();
    sim.set_holding(1, 0, &[1]);
    sim.set_holding(1, 20, &[3]);
    sim.with(|s| s.rejected.insert(10));

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![
            register(1, 0, 1, DataType::Int16, FunctionCode::HoldingRegister),
            register(1, 10, 1, DataType::Int16, FunctionCode::HoldingRegister),
            register(1, 20, 1, DataType::Int16, FunctionCode::HoldingRegister),
        ],
    );

    let report = connector.poll().await;
    assert_eq!(tags(&report.data), vec!["1:0", "1:20"]);
    assert_eq!(report.read_failures, 1);
    assert_eq!(report.skipped, 0);
    assert!(!report.is_complete());

    // An exception answer leaves the connection usable.
    assert_eq!(connector.connection_state(), ConnectionState::Connected);
    assert_eq!(sim.with(|s| s.connects), 1);
}

#[tokio::test]
async fn test_dropped_transport_reconnects_on_next_read() {
    let sim = SimDevice::default();
    sim.set_holding(1, 0, &[7]);
    sim.set_holding(1, 1, &[8]);
    sim.with(|s| s.drop_next = true);

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![
            register(1, 0, 1, DataType::Int16, FunctionCode::HoldingRegister),
            register(1, 1, 1, DataType::Int16, FunctionCode::HoldingRegister),
        ],
    );

    let report = connector.poll().await;
    assert_eq!(report.read_failures, 1);
    assert_eq!(tags(&report.data), vec!["1:1"]);
    assert_eq!(sim.with(|s| s.connects), 2);

    let report = connector.poll().await;
    assert!(report.is_complete());
    assert_eq!(tags(&report.data), vec!["1:0", "1:1"]);
    assert_eq!(sim.with(|s| s.connects), 2);
}

#[tokio::test]
async fn test_unsupported_function_code_yields_no_tags() {
    let sim = SimDevice::default();
    sim.set_holding(1, 5, &[42]);

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![
            register(1, 0, 4, DataType::Int16, FunctionCode::Unsupported),
            register(1, 5, 1, DataType::Int16, FunctionCode::HoldingRegister),
        ],
    );

    let report = connector.poll().await;
    assert!(report.is_complete());
    assert_eq!(tags(&report.data), vec!["1:5"]);
    assert_eq!(sim.with(|s| s.reads), 1);
}

#[tokio::test]
async fn test_word_swapped_device() {
    let sim = SimDevice::default();
    // 3.14 and 3_000_000_000, low word first.
    sim.set_holding(2, 0, &[0xF5C3, 0x4048]);
    sim.set_holding(2, 10, &[0x5E00, 0xB2D0]);

    let mut connector = connector(
        &sim,
        Endianness::MidBigEndian,
        vec![
            register(2, 0, 1, DataType::Float, FunctionCode::HoldingRegister),
            register(2, 10, 1, DataType::Uint32, FunctionCode::HoldingRegister),
        ],
    );

    let data = connector.get_all_data().await;
    assert_eq!(tags(&data), vec!["2:0", "2:10"]);
    assert_eq!(data[0].value, DecodedValue::Float32(f32::from_bits(0x4048_F5C3)));
    assert_eq!(data[1].value, DecodedValue::UInt32(3_000_000_000));
}

#[tokio::test]
async fn test_short_answer_is_a_decode_failure() {
    let sim = SimDevice::default();
    sim.set_holding(1, 0, &[0x4048, 0xF5C3]);
    sim.set_holding(1, 2, &[9]);
    sim.with(|s| s.truncated.insert(0));

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![
            register(1, 0, 1, DataType::Float, FunctionCode::HoldingRegister),
            register(1, 2, 1, DataType::Int16, FunctionCode::HoldingRegister),
        ],
    );

    let report = connector.poll().await;
    assert_eq!(report.decode_failures, 1);
    assert_eq!(report.read_failures, 0);
    assert_eq!(tags(&report.data), vec!["1:2"]);
}

#[tokio::test]
async fn test_unreachable_device_skips_pass_and_retries_later() {
    let sim = SimDevice::default();
    sim.set_holding(1, 0, &[1, 2]);
    sim.with(|s| s.unreachable = true);

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![
            register(1, 0, 1, DataType::Int16, FunctionCode::HoldingRegister),
            register(1, 1, 1, DataType::Int16, FunctionCode::HoldingRegister),
        ],
    );

    let report = connector.poll().await;
    assert!(report.data.is_empty());
    assert_eq!(report.skipped, 2);
    assert!(matches!(
        report.connection_error,
        Some(ConnectionError::Io { .. })
    ));
    assert_eq!(connector.connection_state(), ConnectionState::Unconnected);

    sim.with(|s| s.unreachable = false);
    let report = connector.poll().await;
    assert!(report.is_complete());
    assert_eq!(tags(&report.data), vec!["1:0", "1:1"]);
}

#[tokio::test]
async fn test_get_data_by_tag() {
    let sim = SimDevice::default();
    sim.set_input(3, 200, &[0x0000, 0x3FC0, 0x0000, 0xC000]);

    let mut connector = connector(
        &sim,
        Endianness::MidBigEndian,
        vec![register(3, 200, 2, DataType::Float, FunctionCode::InputRegister)],
    );

    let value = connector.get_data(&"3:201".parse::<Tag>().unwrap()).await;
    assert_eq!(value.unwrap(), Some(DecodedValue::Float32(-2.0)));

    let missing = connector.get_data(&Tag::new(3, 202)).await;
    assert_eq!(missing.unwrap(), None);

    sim.with(|s| s.rejected.insert(200));
    let failed = connector.get_data(&Tag::new(3, 200)).await;
    assert!(matches!(failed, Err(PollError::Read(_))));
}

#[tokio::test]
async fn test_dispose_closes_connection() {
    let sim = SimDevice::default();

    let mut connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![register(1, 0, 1, DataType::Int16, FunctionCode::HoldingRegister)],
    );

    connector.poll().await;
    assert_eq!(connector.connection_state(), ConnectionState::Connected);

    connector.dispose().await;
    assert_eq!(connector.connection_state(), ConnectionState::Unconnected);
    assert_eq!(sim.with(|s| s.disconnects), 1);

    connector.poll().await;
    assert_eq!(sim.with(|s| s.connects), 2);
}

fn unique_prefix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_{}/modbus", nanos)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_poller_publishes_then_closes_connection_on_shutdown() {
    let prefix = unique_prefix();
    let session = zenoh::open(zenoh::Config::default())
        .await
        .expect("Failed to open Zenoh session");
    let subscriber = session
        .declare_subscriber(format!("{}/**", prefix))
        .await
        .expect("Failed to create subscriber");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let sim = SimDevice::default();
    sim.set_holding(1, 0, &[0x4048, 0xF5C3]);
    let connector = connector(
        &sim,
        Endianness::BigEndian,
        vec![register(1, 0, 1, DataType::Float, FunctionCode::HoldingRegister)],
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = ModbusPoller::new(
        connector,
        Duration::from_secs(60),
        &prefix,
        session.clone(),
        Format::Json,
    );
    let task = tokio::spawn(poller.run(shutdown_rx));

    let sample = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for measurement")
        .expect("Failed to receive measurement");
    assert_eq!(sample.key_expr().as_str(), format!("{}/meter01/1/0", prefix));

    let payload = sample.payload().to_bytes();
    let measurement: Measurement =
        connector_common::decode(&payload, Format::Json).expect("Failed to decode");
    assert_eq!(measurement.tag, "1:0");
    assert!(matches!(measurement.value, MeasurementValue::Float(v) if (v - 3.14).abs() < 1e-6));

    // The poller is sleeping out its interval; shutdown must interrupt it.
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("Poller did not stop")
        .expect("Poller task panicked");

    assert_eq!(sim.with(|s| s.disconnects), 1);

    drop(subscriber);
    session.close().await.expect("Failed to close session");
}
