// CallButton — Tasks (FreeRTOS tasks via std::thread)

pub mod accel;
pub mod dispatch;
pub mod heartbeat;
pub mod input;
pub mod led;
