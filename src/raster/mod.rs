//! CPU raster primitives shared by the mask tools, the matte builder and the inpaint worker.

pub mod blur;
pub mod draw;
pub mod flood;
pub mod flow;
pub mod inpaint;
