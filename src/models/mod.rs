pub mod document;
pub mod money;
pub mod result;

pub use document::{
    DocumentKind, GoodsReceipt, Invoice, InvoiceLine, NewGoodsReceipt, NewInvoice,
    NewPurchaseOrder, OrderLine, PricedLine, PurchaseOrder, ReceiptLine,
};
pub use result::{LineItemMatch, LineStatus, OverallStatus, ResultParts, VerificationResult};
