pub mod world_bank;
