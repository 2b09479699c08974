pub mod candidate_accumulator;
