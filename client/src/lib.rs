//! Client side of a swayroom: pointer kinematics, the participant channel,
//! and the display admission controller.

pub mod display;
pub mod motion;
pub mod room_config;
pub mod shared;
