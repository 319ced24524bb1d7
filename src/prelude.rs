//! Re-imports for convenience
#[doc(no_inline)]
pub use crate::component::{Component, HierComponent};
#[doc(no_inline)]
pub use crate::engine::{Candidate, Dpgmm, Engine, EngineError, Hdpgmm};
#[doc(no_inline)]
pub use crate::mixture::{Mixture, MixtureError};
#[doc(no_inline)]
pub use crate::model::{
    ClusterModel, Conjugate, McMarginal, DEFAULT_MC_DRAWS,
};
#[doc(no_inline)]
pub use crate::mvn::{MvNormal, MvNormalError};
#[doc(no_inline)]
pub use crate::prior::{NiwError, NiwPrior};
#[doc(no_inline)]
pub use crate::transform::{Bounds, BoundsError};
