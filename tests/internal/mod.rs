mod body_tests;
mod lifecycle_tests;
mod pagination_tests;
