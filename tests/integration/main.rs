//! Integration tests for the s5tools command line.
//!
//! Each test writes its inputs with the library, runs the built binary and
//! checks the files it leaves behind.

mod helpers;
mod test_cat_command;
mod test_demux_command;
mod test_merge_command;
mod test_split_command;
mod test_stats_command;
mod test_view_command;
