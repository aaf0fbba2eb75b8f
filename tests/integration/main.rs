mod e2e_test;
mod pipeline_test;
