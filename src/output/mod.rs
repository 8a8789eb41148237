//! Output module for presenting sessions and saved results
//!
//! This module handles:
//! - The end-of-session report printed by the CLI
//! - Listing saved results
//! - Printing the items of one saved result

mod results;

pub use results::{
    format_report, format_result_detail, format_results, print_report, print_result_detail,
    print_results,
};
