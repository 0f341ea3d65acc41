//! Test suites for the HL7 daemon.

mod dispatch_behaviour;
mod support;
mod unit;
