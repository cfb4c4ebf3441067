//! Test helpers: scripted gateway, recording notifier, manual clock

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use traffic_warden::{
    InstanceStatus, TrafficReading,
    clock::Clock,
    config::{Config, Credentials, EngineConfig, TargetConfig},
    gateway::{CloudGateway, GatewayError, GatewayResult},
    notify::{Notifier, Severity},
};

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Create a test target with sensible defaults
pub fn create_test_target(instance_id: &str, name: &str, quota_gb: f64) -> TargetConfig {
    TargetConfig {
        instance_id: instance_id.to_string(),
        name: name.to_string(),
        access_key_id: format!("ak-{instance_id}"),
        access_key_secret: "test-secret".to_string(),
        region_id: "cn-hongkong".to_string(),
        traffic_quota_gb: quota_gb,
    }
}

/// Create a config around the given targets, with fast engine tunables
/// so scripted polls stay short
pub fn create_test_config(targets: Vec<TargetConfig>, state_file: std::path::PathBuf) -> Config {
    Config {
        targets,
        telegram: None,
        engine: EngineConfig {
            notify_cooldown_secs: 3600,
            overlimit_cooldown_secs: 86400,
            max_start_failures: 3,
            start_timeout_secs: 120,
            start_poll_secs: 10,
        },
        state_file,
    }
}

/// Clock whose time only advances when someone sleeps on it.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(secs: i64) -> ManualClock {
        Self {
            now: Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Stop(String),
}

struct TargetScript {
    traffic_bytes: u64,
    /// Status answers served in order; the last one keeps repeating.
    statuses: Vec<InstanceStatus>,
    served: usize,
}

/// Gateway whose answers are scripted per instance id. Unknown ids
/// answer `InstanceNotFound`, like the real provider.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, TargetScript>>,
    commands: Mutex<Vec<Command>>,
}

impl ScriptedGateway {
    pub fn new() -> ScriptedGateway {
        Self::default()
    }

    pub fn script(
        self,
        instance_id: &str,
        traffic_bytes: u64,
        statuses: Vec<InstanceStatus>,
    ) -> ScriptedGateway {
        self.scripts.lock().unwrap().insert(
            instance_id.to_string(),
            TargetScript {
                traffic_bytes,
                statuses,
                served: 0,
            },
        );
        self
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudGateway for ScriptedGateway {
    async fn query_traffic(&self, credentials: &Credentials) -> GatewayResult<TrafficReading> {
        // test credentials carry the instance id (see create_test_target)
        let instance_id = credentials
            .access_key_id
            .strip_prefix("ak-")
            .unwrap_or(&credentials.access_key_id);
        let scripts = self.scripts.lock().unwrap();
        match scripts.get(instance_id) {
            Some(script) => Ok(TrafficReading::from_bytes(script.traffic_bytes)),
            None => Err(GatewayError::Api {
                code: "InvalidAccessKeyId.NotFound".to_string(),
                message: "unknown account".to_string(),
            }),
        }
    }

    async fn query_instance_status(
        &self,
        _credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<InstanceStatus> {
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(instance_id) else {
            return Err(GatewayError::InstanceNotFound(instance_id.to_string()));
        };
        // a script without statuses models an account whose instance id
        // the provider does not know
        if script.statuses.is_empty() {
            return Err(GatewayError::InstanceNotFound(instance_id.to_string()));
        }
        let index = script.served.min(script.statuses.len() - 1);
        script.served += 1;
        Ok(script.statuses[index])
    }

    async fn start_instance(
        &self,
        _credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<()> {
        self.commands
            .lock()
            .unwrap()
            .push(Command::Start(instance_id.to_string()));
        Ok(())
    }

    async fn stop_instance(
        &self,
        _credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<()> {
        self.commands
            .lock()
            .unwrap()
            .push(Command::Stop(instance_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn new() -> RecordingNotifier {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Severity)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, title: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(sent_title, _)| sent_title == title)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, _body: &str, severity: Severity) {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), severity));
    }
}
