mod common;
mod post_tests;
