pub mod assignment;
pub mod extraction;
pub mod flood_fill;
pub mod morphology;
pub mod overlap;
pub mod preprocessing;
pub mod segmentation;
pub mod simplification;

pub use assignment::assign;
pub use extraction::{ContourVectorizer, TracedRegion};
pub use flood_fill::{Selection, SelectionOutcome, select_boundary, select_tolerance};
pub use morphology::{MaskCleaner, fill_holes};
pub use overlap::overlaps;
pub use preprocessing::{ContrastEnhancePreprocessor, GaussianDenoisePreprocessor};
pub use segmentation::ColorSegmenter;
pub use simplification::simplify_closed;
