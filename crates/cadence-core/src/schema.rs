//! Payload schemas carried by each service.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarState {
    pub v_ego: f32,
    pub a_ego: f32,
    pub steering_angle_deg: f32,
    pub gas_pressed: bool,
    pub brake_pressed: bool,
    pub cruise: CruiseState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CruiseState {
    pub enabled: bool,
    pub available: bool,
    pub speed: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlsState {
    pub enabled: bool,
    pub active: bool,
    pub curvature: f32,
    pub cum_lag_ms: f32,
}

/// Position/velocity samples along a predicted horizon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XyztData {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    pub t: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelV2 {
    pub frame_id: u32,
    pub position: XyztData,
    pub velocity: XyztData,
    pub lane_lines: Vec<XyztData>,
    pub lane_line_probs: Vec<f32>,
    pub meta: ModelMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub engaged_prob: f32,
    pub disengage_predictions: Vec<DisengagePrediction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisengagePrediction {
    pub t: Vec<f32>,
    pub brake_disengage_probs: Vec<f32>,
    pub steer_override_probs: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarState {
    pub lead_one: LeadData,
    pub lead_two: LeadData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadData {
    pub status: bool,
    pub d_rel: f32,
    pub v_rel: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub free_space_percent: f32,
    pub memory_usage_percent: i8,
    pub cpu_temp_c: Vec<f32>,
    pub started: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PandaState {
    pub ignition_line: bool,
    pub controls_allowed: bool,
    pub rx_buffer_overflow: u32,
    pub tx_buffer_overflow: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveCalibration {
    pub cal_status: i8,
    pub cal_perc: i8,
    pub rpy_calib: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarParams {
    pub car_fingerprint: String,
    pub mass: f32,
    pub wheelbase: f32,
    pub steer_ratio: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f32,
    pub has_fix: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanFrame {
    pub address: u32,
    pub src: u8,
    pub dat: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnroadEvent {
    pub name: String,
    pub enable: bool,
    pub no_entry: bool,
    pub warning: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFlag {}
