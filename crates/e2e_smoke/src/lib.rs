//! Smoke tests for the witness service live in `tests/`.
