pub mod card_detector;
