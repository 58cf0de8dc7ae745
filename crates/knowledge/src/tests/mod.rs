//! Cross-module tests.

mod pipeline;
