// Module audio - Backends de sortie, décodage et rendu temps-réel

pub mod buffer;
pub mod channels;
pub mod decode;
pub mod dynamics;
pub mod engine;
pub mod mixer;
pub mod oscillator;
pub mod output;
pub mod recorder;
