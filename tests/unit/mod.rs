// Unit tests module

mod auth_test;
mod prompts_test;
