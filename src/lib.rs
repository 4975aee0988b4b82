//! Dispersal Engine — stochastic multistage recruitment modelling.
//!
//! Models recruitment (seed dispersal, or any multistage branching
//! process) as a rooted tree of stages. Each stage routes its incoming
//! population fraction to its children according to a named casting
//! table of transition probabilities; repeated iterations with
//! bootstrap-resampled table rows yield trajectories of population
//! reaching the terminal stages.

pub mod core;
pub mod schema;
