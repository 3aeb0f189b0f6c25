pub mod tile_retriever;
