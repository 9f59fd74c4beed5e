pub mod prompt_ops;
