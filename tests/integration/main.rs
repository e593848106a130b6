//! Integration tests: full ticks against a scripted exchange.

mod tick_flow;
