pub mod erezept;
pub mod export;
pub mod hello;
pub mod scheduler;
pub mod self_disclosure;
