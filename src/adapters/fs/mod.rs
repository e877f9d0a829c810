pub mod output_dir;
