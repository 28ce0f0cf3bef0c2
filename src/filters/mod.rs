pub mod complementary;
