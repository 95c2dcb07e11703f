//! Integration tests for FPGA clock acceptance testing.
//!
//! These tests run against the simulated peripheral and need no
//! privileges; the raw port checks skip themselves without root.

mod common;
mod lifecycle_test;
mod mutual_exclusion_test;
