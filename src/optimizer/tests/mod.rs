//! Cross-module scenario tests.
