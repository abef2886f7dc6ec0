use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure for the platooning engine.
///
/// Every tunable here is externally supplied; nothing is hardcoded in the
/// engine itself. Defaults mirror the reference deployment values.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatoonConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub formation: FormationConfig,
    #[serde(default)]
    pub leader_selection: LeaderSelectionConfig,
    #[serde(default)]
    pub caps: CapsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gap-control loop parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Maximum commanded acceleration magnitude (m/s^2)
    #[serde(default = "default_max_accel")]
    pub max_accel: f64,
    /// Minimum length of an inserted steady-speed maneuver (m)
    #[serde(default = "default_min_maneuver_length")]
    pub min_maneuver_length: f64,
    /// Proportional gain for the gap PID
    #[serde(default = "default_kp")]
    pub kp: f64,
    /// Integral gain for the gap PID
    #[serde(default = "default_ki")]
    pub ki: f64,
    /// Derivative gain for the gap PID
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Member staleness timeout, as a multiple of the status interval
    #[serde(default = "default_status_timeout_factor")]
    pub status_timeout_factor: f64,
    /// Host vehicle length (m)
    #[serde(default = "default_vehicle_length")]
    pub vehicle_length: f64,
    /// Control loop period (ms)
    #[serde(default = "default_control_period_ms")]
    pub control_period_ms: u64,
    /// Maximum adjustment away from the reference commanded speed (m/s)
    #[serde(default = "default_cmd_speed_max_adjustment")]
    pub cmd_speed_max_adjustment: f64,
}

/// Platoon forming and membership parameters
#[derive(Debug, Clone, Deserialize)]
pub struct FormationConfig {
    /// Maximum platoon size including the host
    #[serde(default = "default_max_platoon_size")]
    pub max_platoon_size: usize,
    /// Desired time headway to the vehicle in front (s)
    #[serde(default = "default_time_headway")]
    pub time_headway: f64,
    /// Desired gap at standstill (m)
    #[serde(default = "default_stand_still_headway")]
    pub stand_still_headway: f64,
    /// Largest time gap a joining candidate may have to the platoon rear (s)
    #[serde(default = "default_max_allowed_join_time_gap")]
    pub max_allowed_join_time_gap: f64,
    /// Largest distance gap a joining candidate may have to the platoon rear (m)
    #[serde(default = "default_max_allowed_join_gap")]
    pub max_allowed_join_gap: f64,
    /// Time gap a candidate should close to before joining (s)
    #[serde(default = "default_desired_join_time_gap")]
    pub desired_join_time_gap: f64,
    /// Distance gap a candidate should close to before joining (m)
    #[serde(default = "default_desired_join_gap")]
    pub desired_join_gap: f64,
    /// How long a leader waits for a confirmed join before giving up (s)
    #[serde(default = "default_waiting_state_timeout")]
    pub waiting_state_timeout: f64,
}

/// Parameters gating the leader-selection fallback
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderSelectionConfig {
    /// Leader-selection variant: 0 = frontmost leader, 1 = immediate predecessor
    #[serde(default)]
    pub algorithm_variant: u8,
    /// Predecessor time gap below which the fallback engages (s)
    #[serde(default = "default_lower_boundary")]
    pub lower_boundary: f64,
    /// Predecessor time gap required before leader-following resumes (s)
    #[serde(default = "default_upper_boundary")]
    pub upper_boundary: f64,
    /// Time gap to the leader above which the host falls back to its predecessor (s)
    #[serde(default = "default_max_spacing")]
    pub max_spacing: f64,
    /// Time gap below which leader-following is restored (s)
    #[serde(default = "default_min_spacing")]
    pub min_spacing: f64,
    /// Distance gap below which leader-following is restored (m)
    #[serde(default = "default_min_gap")]
    pub min_gap: f64,
    /// Distance gap above which the host falls back to its predecessor (m)
    #[serde(default = "default_max_gap")]
    pub max_gap: f64,
}

/// Independently toggleable caps on the controller output
#[derive(Debug, Clone, Deserialize)]
pub struct CapsConfig {
    /// Never command above the local speed limit
    #[serde(default = "default_true")]
    pub speed_limit_cap: bool,
    /// Never imply an acceleration beyond `max_accel`
    #[serde(default = "default_true")]
    pub max_accel_cap: bool,
    /// Never deviate from the reference commanded speed by more than
    /// `cmd_speed_max_adjustment`
    #[serde(default = "default_true")]
    pub leader_speed_cap: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_accel() -> f64 {
    2.5
}
fn default_min_maneuver_length() -> f64 {
    15.0
}
fn default_kp() -> f64 {
    1.5
}
fn default_ki() -> f64 {
    0.0
}
fn default_kd() -> f64 {
    -0.1
}
fn default_status_timeout_factor() -> f64 {
    2.5
}
fn default_vehicle_length() -> f64 {
    5.0
}
fn default_control_period_ms() -> u64 {
    100
}
fn default_cmd_speed_max_adjustment() -> f64 {
    10.0
}
fn default_max_platoon_size() -> usize {
    10
}
fn default_time_headway() -> f64 {
    2.0
}
fn default_stand_still_headway() -> f64 {
    12.0
}
fn default_max_allowed_join_time_gap() -> f64 {
    15.0
}
fn default_max_allowed_join_gap() -> f64 {
    90.0
}
fn default_desired_join_time_gap() -> f64 {
    4.0
}
fn default_desired_join_gap() -> f64 {
    30.0
}
fn default_waiting_state_timeout() -> f64 {
    25.0
}
fn default_lower_boundary() -> f64 {
    1.6
}
fn default_upper_boundary() -> f64 {
    1.7
}
fn default_max_spacing() -> f64 {
    4.0
}
fn default_min_spacing() -> f64 {
    3.9
}
fn default_min_gap() -> f64 {
    22.0
}
fn default_max_gap() -> f64 {
    32.0
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_accel: default_max_accel(),
            min_maneuver_length: default_min_maneuver_length(),
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            status_timeout_factor: default_status_timeout_factor(),
            vehicle_length: default_vehicle_length(),
            control_period_ms: default_control_period_ms(),
            cmd_speed_max_adjustment: default_cmd_speed_max_adjustment(),
        }
    }
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            max_platoon_size: default_max_platoon_size(),
            time_headway: default_time_headway(),
            stand_still_headway: default_stand_still_headway(),
            max_allowed_join_time_gap: default_max_allowed_join_time_gap(),
            max_allowed_join_gap: default_max_allowed_join_gap(),
            desired_join_time_gap: default_desired_join_time_gap(),
            desired_join_gap: default_desired_join_gap(),
            waiting_state_timeout: default_waiting_state_timeout(),
        }
    }
}

impl Default for LeaderSelectionConfig {
    fn default() -> Self {
        Self {
            algorithm_variant: 0,
            lower_boundary: default_lower_boundary(),
            upper_boundary: default_upper_boundary(),
            max_spacing: default_max_spacing(),
            min_spacing: default_min_spacing(),
            min_gap: default_min_gap(),
            max_gap: default_max_gap(),
        }
    }
}

impl Default for CapsConfig {
    fn default() -> Self {
        Self {
            speed_limit_cap: true,
            max_accel_cap: true,
            leader_speed_cap: true,
        }
    }
}

impl Default for PlatoonConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            formation: FormationConfig::default(),
            leader_selection: LeaderSelectionConfig::default(),
            caps: CapsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PlatoonConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Override with environment variables (CONVOY_CONTROL__KP, etc.)
            .add_source(
                Environment::with_prefix("CONVOY")
                    .separator("__")
                    .try_parsing(true),
            );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.log_loaded();
        Ok(loaded)
    }

    /// Log every loaded tunable at debug level
    pub fn log_loaded(&self) {
        tracing::debug!("Load param max_accel = {}", self.control.max_accel);
        tracing::debug!(
            "Load param min_maneuver_length = {}",
            self.control.min_maneuver_length
        );
        tracing::debug!(
            "Load param gap PID gains: [p = {}, i = {}, d = {}]",
            self.control.kp,
            self.control.ki,
            self.control.kd
        );
        tracing::debug!(
            "Load param status_timeout_factor = {}",
            self.control.status_timeout_factor
        );
        tracing::debug!(
            "Load param vehicle_length = {}",
            self.control.vehicle_length
        );
        tracing::debug!(
            "Load param max_platoon_size = {}",
            self.formation.max_platoon_size
        );
        tracing::debug!(
            "Load param algorithm_variant = {}",
            self.leader_selection.algorithm_variant
        );
        tracing::debug!("Load param time_headway = {}", self.formation.time_headway);
        tracing::debug!(
            "Load param stand_still_headway = {}",
            self.formation.stand_still_headway
        );
        tracing::debug!(
            "Load param waiting_state_timeout = {}",
            self.formation.waiting_state_timeout
        );
        tracing::debug!(
            "Load param cmd_speed_max_adjustment = {}",
            self.control.cmd_speed_max_adjustment
        );
        tracing::debug!(
            "Load param join gaps: max_time = {}, max = {}, desired_time = {}, desired = {}",
            self.formation.max_allowed_join_time_gap,
            self.formation.max_allowed_join_gap,
            self.formation.desired_join_time_gap,
            self.formation.desired_join_gap
        );
        tracing::debug!(
            "Load param leader selection bounds: [{}, {}] s predecessor, \
             spacing [{}, {}] s, gap [{}, {}] m",
            self.leader_selection.lower_boundary,
            self.leader_selection.upper_boundary,
            self.leader_selection.min_spacing,
            self.leader_selection.max_spacing,
            self.leader_selection.min_gap,
            self.leader_selection.max_gap
        );
        tracing::debug!(
            "Load param caps: speed_limit = {}, max_accel = {}, leader_speed = {}",
            self.caps.speed_limit_cap,
            self.caps.max_accel_cap,
            self.caps.leader_speed_cap
        );
    }

    /// Member staleness timeout derived from the status cadence
    pub fn status_timeout(&self) -> std::time::Duration {
        let ms = self.control.status_timeout_factor * crate::STATUS_INTERVAL_LENGTH_MS as f64;
        std::time::Duration::from_millis(ms as u64)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.control.max_accel <= 0.0 {
            errors.push("max_accel must be positive".to_string());
        }
        if self.control.control_period_ms == 0 {
            errors.push("control_period_ms must be positive".to_string());
        }
        if self.control.status_timeout_factor <= 1.0 {
            errors.push("status_timeout_factor must exceed 1.0".to_string());
        }
        if self.formation.max_platoon_size < 2 {
            errors.push("max_platoon_size must allow at least one follower".to_string());
        }
        if self.formation.time_headway < 0.0 || self.formation.stand_still_headway < 0.0 {
            errors.push("headway terms must be non-negative".to_string());
        }
        if self.formation.desired_join_gap > self.formation.max_allowed_join_gap {
            errors.push("desired_join_gap must not exceed max_allowed_join_gap".to_string());
        }
        if self.formation.desired_join_time_gap > self.formation.max_allowed_join_time_gap {
            errors
                .push("desired_join_time_gap must not exceed max_allowed_join_time_gap".to_string());
        }
        if self.leader_selection.min_spacing >= self.leader_selection.max_spacing {
            errors.push("min_spacing must be below max_spacing".to_string());
        }
        if self.leader_selection.min_gap >= self.leader_selection.max_gap {
            errors.push("min_gap must be below max_gap".to_string());
        }
        if self.leader_selection.lower_boundary >= self.leader_selection.upper_boundary {
            errors.push("lower_boundary must be below upper_boundary".to_string());
        }
        if self.leader_selection.algorithm_variant > 1 {
            errors.push("algorithm_variant must be 0 or 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
