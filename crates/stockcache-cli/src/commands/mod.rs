//! CLI 명령어 구현 모듈.

pub mod daemon;
pub mod inspect;
pub mod maintain;
