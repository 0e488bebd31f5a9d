pub mod devices;
pub mod error;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use devices::{AudioPlayer, Devices, KeySource, PhysiologyRecorder, Renderer, SessionLog, TriggerEmitter};
pub use error::{ConfigError, Device, DeviceResultExt, SessionError};
pub use phase::{ResponseStage, TrialPhase};
pub use stimulus::{Clip, Hemifield, KeyPress, Marker};
pub use trial::{Outcome, PhysioSample, ProbeEvent, TrialRecord};
