pub mod balance_verification;
pub mod input_selection;
pub mod output_allocation;
pub mod request_assembler;
pub mod utxo_view;
