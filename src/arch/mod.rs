//! # Architecture abstraction layer
//!
//! Provides the hardware abstraction boundary the core assumes: the raw
//! context switch, LL/SC word primitives, and tick generation described
//! in the porting-layer contract. Currently implements the Cortex-M4
//! port; extensible to other architectures by adding sibling modules.

pub mod cortex_m4;
