test_r::enable!();

mod all;
