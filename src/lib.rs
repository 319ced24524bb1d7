//! Online Dirichlet process Gaussian mixture density estimation on bounded
//! domains.
//!
//! `dpmix` reconstructs an unknown probability density from samples with an
//! infinite-component Gaussian mixture: each incoming sample joins an
//! existing cluster or opens a new one under a Chinese-restaurant-process
//! prior, conjugate sufficient statistics are updated incrementally, and
//! the concentration parameter adapts by Metropolis-Hastings. Everything
//! runs in an unconstrained space reached through an invertible probit
//! transform, so the frozen [`Mixture`](mixture::Mixture) evaluates,
//! samples, and differentiates in the natural bounded coordinates.
//!
//! A hierarchical variant ([`Hdpgmm`](engine::Hdpgmm)) infers a
//! population-level density when each observation is itself a per-object
//! mixture draw, marginalizing cluster membership over a Monte-Carlo grid
//! of prior-predictive components.
//!
//! # Example
//!
//! ```
//! use dpmix::prelude::*;
//! use nalgebra::dvector;
//! use rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256Plus;
//!
//! let mut rng = Xoshiro256Plus::seed_from_u64(0xC0FFEE);
//!
//! let bounds = Bounds::new(&[(-10.0, 10.0)]).unwrap();
//! let mut engine = Dpgmm::new(bounds, None, 1.0).unwrap();
//!
//! // two well-separated lobes
//! let samples: Vec<_> = (0..100)
//!     .map(|i| {
//!         let jitter = 0.001 * i as f64;
//!         if i % 2 == 0 {
//!             dvector![-2.0 + jitter]
//!         } else {
//!             dvector![3.0 + jitter]
//!         }
//!     })
//!     .collect();
//!
//! let density = engine.density_from_samples(&samples, &mut rng).unwrap();
//!
//! let p_lobe = density.pdf(&dvector![-2.0]).unwrap();
//! let p_gap = density.pdf(&dvector![0.5]).unwrap();
//! assert!(p_lobe > p_gap);
//!
//! // the engine reset itself and is ready for the next independent draw
//! assert_eq!(engine.n_points(), 0);
//! ```
pub mod alpha;
pub mod component;
pub mod consts;
pub mod engine;
pub mod misc;
pub mod mixture;
pub mod model;
pub mod mvn;
pub mod prelude;
pub mod prior;
pub mod transform;
mod wishart;
