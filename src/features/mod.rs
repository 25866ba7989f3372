pub mod og;
