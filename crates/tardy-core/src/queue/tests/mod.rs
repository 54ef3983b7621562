use super::*;
use crate::clock::ManualClock;
use crate::metrics::test_harness::MetricTestHarness;
use crate::storage::MemoryStorage;

mod common;
use common::*;

mod delivery;
