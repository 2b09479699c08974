pub mod frame_worker;
