//! End-to-end tests against mock listing sites

mod scrape_tests;
