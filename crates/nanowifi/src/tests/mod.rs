//! Shared test doubles and behavioural suites.

pub(crate) mod support;
