pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use bbox::{prelude::*, LTRB};
pub use dashmap::DashMap;
pub use derivative::Derivative;
pub use getset::{CopyGetters, Getters};
pub use itertools::izip;
pub use log::{debug, warn};
pub use ndarray::{s, Array2, Array3, ArrayViewMut2, Zip};
pub use noisy_float::prelude::*;
pub use rayon::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    convert::{TryFrom, TryInto},
    ops::Range,
    path::Path,
    str::FromStr,
};
pub use strum::Display;
pub use tch::{Device, IndexOp, Kind, Tensor};
pub use tch_goodies::{LtrbTensor, LtrbTensorUnchecked, TensorExt as _};
pub use tch_modules::{
    CenterFocalLoss, CenterFocalLossInit, WeightedGIoULoss, WeightedGIoULossInit,
};
pub use tch_tensor_like::TensorLike;

unzip_n::unzip_n!(pub 3);
