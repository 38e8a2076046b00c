#![deny(warnings)]

pub mod augment;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod decode;
pub mod emotion;
pub mod features;
pub mod pipeline;
pub mod recommend;
