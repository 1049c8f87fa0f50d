//! Integration tests for the harvester
//!
//! These tests drive the full crawl loop end-to-end against scripted
//! in-memory browser sessions.

mod harvest_tests;
