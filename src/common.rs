pub use anyhow::{bail, ensure, format_err, Context, Result};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    fs, iter,
    path::{Path, PathBuf},
};
pub use tch::{
    kind::FLOAT_CPU,
    nn::{self, Module},
    Device, Kind, Tensor,
};
pub use tracing::{debug, info, warn};
