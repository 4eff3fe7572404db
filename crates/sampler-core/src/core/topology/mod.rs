//! # Topology Module
//!
//! Atom-selection queries over a [`Topology`](crate::core::models::topology::Topology).
//!
//! ## Overview
//!
//! Collective variables and trajectory loading both need to pick subsets of atoms
//! by name, residue, element or structural role. The [`selection`] module parses
//! a small query language in the style commonly used by trajectory analysis tools:
//!
//! - **Keywords** - `all`, `none`, `protein`, `water`, `backbone`, `sidechain`, `heavy`
//! - **Fields** - `name`, `resname`, `element`, `resSeq`, `resid`, `index`, with
//!   optional comparison operators and `a to b` ranges for numeric fields
//! - **Combinators** - `and`, `or`, `not` and parentheses
//!
//! ## Usage
//!
//! ```ignore
//! use statesampler::core::topology::selection::select;
//!
//! let heavy_protein_atoms = select(trajectory.topology(), "protein and element != 'H'")?;
//! ```

pub mod selection;
