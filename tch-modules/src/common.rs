pub use anyhow::{ensure, Result};
pub use log::debug;
pub use tch::{Device, Kind, Tensor};
pub use tch_goodies::{LtrbTensor, TensorExt};
