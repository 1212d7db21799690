// Test helpers shared by the integration and unit test targets
//
// Everything runs in-process: in-memory stores, scripted gateway and risk
// doubles, recording notifier and bus, and a clock the test controls.
//
// Usage:
//   #[path = "../helpers/mod.rs"]
//   mod helpers;
//   use helpers::*;
//
//   let h = Harness::new();
//   let (_, installments) = h.seed_payment("cust-1", 1, h.today(), dec!(100)).await;
//   let result = h.processor.process(&installments[0], &h.correlation_id()).await?;
#![allow(dead_code)]

pub mod harness;

pub use clock::*;
pub use doubles::*;
pub use harness::*;
