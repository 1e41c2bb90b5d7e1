mod test_block_view;
mod test_schema;
