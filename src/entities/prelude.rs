pub use super::business_tokens::Entity as BusinessTokens;
pub use super::token_purchases::Entity as TokenPurchases;
