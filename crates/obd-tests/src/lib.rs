//! End-to-end tests for the OBD-II stack
//!
//! The tests in `tests/` connect an `ObdClient` and an `EcuSimulator` over
//! an in-process virtual CAN bus, so no CAN hardware or vcan interface is
//! needed:
//!
//! ```bash
//! cargo test -p obd-tests
//! ```
//!
//! # Test Structure
//!
//! - `e2e_test.rs` - Client requests answered by the simulator

// This crate only contains tests, no library code
