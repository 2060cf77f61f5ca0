/*!
 * Support
 * Small process-level helpers used around a channel: random tokens, a
 * private temp folder, and child-process setup
 */

pub mod process;
pub mod random;
pub mod temp;

pub use process::init_process;
pub use random::{next_rand32, next_rand64, rand_str};
pub use temp::{cleanup_temp_folder, temp_folder};
