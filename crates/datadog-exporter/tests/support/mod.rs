// Each integration test compiles this module independently via `mod support;`,
// so items used by one test appear unused in others.
#![allow(unused)]

pub mod collector;
