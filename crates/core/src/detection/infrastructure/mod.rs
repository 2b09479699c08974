pub mod contour_card_detector;
pub mod contour_math;
