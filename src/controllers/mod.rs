pub mod audio;
pub mod health;

pub use audio::AudioController;
