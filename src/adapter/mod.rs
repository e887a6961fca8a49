pub mod opensearch;
